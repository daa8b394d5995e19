//! Price Oracle
//!
//! Holds the current exchange rate between the collateral asset and the
//! debt token: the debt-token value of one whole collateral unit, with 8
//! decimals. Only the registered feeder may replace the price; every
//! replacement is atomic and immediately visible to subsequent reads.
//!
//! The oracle keeps no history - the latest datum is the whole state.
//! Indexers that want a price series subscribe to `PriceUpdated` events
//! instead.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use cdp_common::{
    errors::{CdpError, CdpResult},
    types::{Address, PriceData, PriceSource},
};

/// Single-feeder spot price oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceOracle {
    /// The only address allowed to set prices
    feeder: Address,
    /// Latest price datum; `None` until the first update
    latest: Option<PriceData>,
}

impl PriceOracle {
    /// Create a new oracle with no price set
    pub fn new(feeder: Address) -> Self {
        Self {
            feeder,
            latest: None,
        }
    }

    /// Current feeder address
    pub fn feeder(&self) -> Address {
        self.feeder
    }

    /// Latest price, or `Uninitialized` before the first update
    pub fn price(&self) -> CdpResult<u64> {
        self.latest
            .as_ref()
            .map(|p| p.price)
            .ok_or(CdpError::Uninitialized)
    }

    /// Full latest price datum, if any
    pub fn latest(&self) -> Option<&PriceData> {
        self.latest.as_ref()
    }

    /// Replace the price (feeder only, manual source)
    pub fn set_price(&mut self, caller: Address, price: u64, block_height: u64) -> CdpResult<()> {
        self.set_price_from(caller, price, PriceSource::Manual, block_height)
    }

    /// Replace the price with an explicit source tag (feeder only)
    pub fn set_price_from(
        &mut self,
        caller: Address,
        price: u64,
        source: PriceSource,
        block_height: u64,
    ) -> CdpResult<()> {
        if caller != self.feeder {
            return Err(CdpError::Unauthorized {
                expected: self.feeder,
                actual: caller,
            });
        }
        if price == 0 {
            return Err(CdpError::InvalidPrice { price });
        }

        self.latest = Some(PriceData::new(price, block_height, source));
        Ok(())
    }

    /// Hand the feeder role to a new address (current feeder only)
    pub fn rotate_feeder(&mut self, caller: Address, new_feeder: Address) -> CdpResult<()> {
        if caller != self.feeder {
            return Err(CdpError::Unauthorized {
                expected: self.feeder,
                actual: caller,
            });
        }
        if new_feeder == [0u8; 32] {
            return Err(CdpError::InvalidInput {
                param: "new_feeder",
                reason: "cannot hand the feeder role to the zero address",
            });
        }

        self.feeder = new_feeder;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICE_200: u64 = 200 * 100_000_000;

    fn feeder() -> Address {
        [1u8; 32]
    }

    #[test]
    fn test_uninitialized_read() {
        let oracle = PriceOracle::new(feeder());
        assert_eq!(oracle.price(), Err(CdpError::Uninitialized));
        assert!(oracle.latest().is_none());
    }

    #[test]
    fn test_set_and_read_price() {
        let mut oracle = PriceOracle::new(feeder());
        oracle.set_price(feeder(), PRICE_200, 10).unwrap();

        assert_eq!(oracle.price().unwrap(), PRICE_200);
        let datum = oracle.latest().unwrap();
        assert_eq!(datum.updated_at_block, 10);
        assert_eq!(datum.source, PriceSource::Manual);

        // Replacement is immediate
        oracle.set_price(feeder(), PRICE_200 / 2, 11).unwrap();
        assert_eq!(oracle.price().unwrap(), PRICE_200 / 2);
    }

    #[test]
    fn test_set_price_unauthorized() {
        let mut oracle = PriceOracle::new(feeder());
        let result = oracle.set_price([9u8; 32], PRICE_200, 10);
        assert!(matches!(result, Err(CdpError::Unauthorized { .. })));
        assert_eq!(oracle.price(), Err(CdpError::Uninitialized));
    }

    #[test]
    fn test_set_price_zero_rejected() {
        let mut oracle = PriceOracle::new(feeder());
        assert_eq!(
            oracle.set_price(feeder(), 0, 10),
            Err(CdpError::InvalidPrice { price: 0 })
        );
    }

    #[test]
    fn test_feeder_rotation() {
        let mut oracle = PriceOracle::new(feeder());
        let new_feeder = [2u8; 32];

        // Only the current feeder can rotate
        assert!(matches!(
            oracle.rotate_feeder([9u8; 32], new_feeder),
            Err(CdpError::Unauthorized { .. })
        ));

        oracle.rotate_feeder(feeder(), new_feeder).unwrap();
        assert_eq!(oracle.feeder(), new_feeder);

        // Old feeder lost the role
        assert!(matches!(
            oracle.set_price(feeder(), PRICE_200, 10),
            Err(CdpError::Unauthorized { .. })
        ));
        oracle
            .set_price_from(new_feeder, PRICE_200, PriceSource::Feed, 10)
            .unwrap();
        assert_eq!(oracle.latest().unwrap().source, PriceSource::Feed);
    }
}
