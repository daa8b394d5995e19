//! USD Token Ledger
//!
//! Fungible balance ledger for the debt-denominated token. Mint and burn
//! are gated on a single authority - the CDP engine address wired in at
//! construction - while transfer/approve/transfer-from follow the
//! conventional allowance semantics.
//!
//! Every operation performs all of its checks before touching a balance,
//! so a failed call leaves the ledger untouched. The caller identity
//! passed in is trusted: authenticating it is the job of whatever layer
//! imposes the external total order on engine operations.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use cdp_common::{
    constants::token,
    errors::{CdpError, CdpResult},
    math::safe_add,
    types::Address,
};

// ============ Supply Tracking ============

/// Token supply state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TokenSupply {
    /// Current total supply
    pub total_supply: u64,
    /// Total minted (cumulative)
    pub total_minted: u64,
    /// Total burned (cumulative)
    pub total_burned: u64,
}

impl TokenSupply {
    /// Check if a mint would exceed the maximum supply
    pub fn can_mint(&self, amount: u64) -> bool {
        self.total_supply.saturating_add(amount) <= token::MAX_SUPPLY
    }
}

// ============ Ledger ============

/// The USD token ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UsdLedger {
    /// The only address allowed to mint and burn (the engine)
    authority: Address,
    /// Account balances
    balances: BTreeMap<Address, u64>,
    /// (owner, spender) allowances
    allowances: BTreeMap<(Address, Address), u64>,
    /// Supply tracking
    supply: TokenSupply,
}

impl UsdLedger {
    /// Create a new empty ledger with the given mint/burn authority
    pub fn new(authority: Address) -> Self {
        Self {
            authority,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            supply: TokenSupply::default(),
        }
    }

    /// Token name
    pub fn name() -> &'static str {
        token::NAME
    }

    /// Token symbol
    pub fn symbol() -> &'static str {
        token::SYMBOL
    }

    /// Token decimals
    pub fn decimals() -> u8 {
        token::DECIMALS
    }

    // ============ Reads ============

    /// The configured mint/burn authority
    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Balance of an account (0 if never touched)
    pub fn balance_of(&self, owner: &Address) -> u64 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Remaining allowance from `owner` to `spender`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    /// Current total supply
    pub fn total_supply(&self) -> u64 {
        self.supply.total_supply
    }

    /// Full supply tracking state
    pub fn supply(&self) -> &TokenSupply {
        &self.supply
    }

    /// Iterate over all accounts with a recorded balance
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.balances.iter()
    }

    // ============ Precondition Probes ============

    /// Read-only check that `from` can cover `amount`
    pub fn check_balance(&self, from: &Address, amount: u64) -> CdpResult<()> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(CdpError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Read-only check that a `transfer_from` by `spender` would succeed
    pub fn check_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        amount: u64,
    ) -> CdpResult<()> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(CdpError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
        self.check_balance(from, amount)
    }

    // ============ Mutations ============

    /// Mint `amount` to `to` (authority only)
    pub fn mint(&mut self, caller: Address, to: Address, amount: u64) -> CdpResult<()> {
        if caller != self.authority {
            return Err(CdpError::Unauthorized {
                expected: self.authority,
                actual: caller,
            });
        }
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        if !self.supply.can_mint(amount) {
            return Err(CdpError::ExceedsMaximum {
                amount,
                maximum: token::MAX_SUPPLY.saturating_sub(self.supply.total_supply),
            });
        }
        let new_balance = safe_add(self.balance_of(&to), amount)?;

        self.balances.insert(to, new_balance);
        self.supply.total_supply += amount;
        self.supply.total_minted = self.supply.total_minted.saturating_add(amount);
        Ok(())
    }

    /// Burn `amount` from `from` (authority only)
    pub fn burn(&mut self, caller: Address, from: Address, amount: u64) -> CdpResult<()> {
        if caller != self.authority {
            return Err(CdpError::Unauthorized {
                expected: self.authority,
                actual: caller,
            });
        }
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        self.check_balance(&from, amount)?;

        *self.balances.entry(from).or_insert(0) -= amount;
        self.supply.total_supply -= amount;
        self.supply.total_burned = self.supply.total_burned.saturating_add(amount);
        Ok(())
    }

    /// Transfer `amount` from `from` to `to`
    pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> CdpResult<()> {
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        if from == to {
            return Err(CdpError::InvalidInput {
                param: "to",
                reason: "cannot transfer to self",
            });
        }
        self.check_balance(&from, amount)?;

        *self.balances.entry(from).or_insert(0) -= amount;
        let new_to = safe_add(self.balance_of(&to), amount)?;
        self.balances.insert(to, new_to);
        Ok(())
    }

    /// Set the allowance from `owner` to `spender` (zero clears it)
    pub fn approve(&mut self, owner: Address, spender: Address, amount: u64) -> CdpResult<()> {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
        Ok(())
    }

    /// Transfer `amount` from `from` to `to` on behalf of `spender`,
    /// consuming allowance
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u64,
    ) -> CdpResult<()> {
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        if from == to {
            return Err(CdpError::InvalidInput {
                param: "to",
                reason: "cannot transfer to self",
            });
        }
        self.check_transfer_from(&spender, &from, amount)?;

        *self.allowances.entry((from, spender)).or_insert(0) -= amount;
        *self.balances.entry(from).or_insert(0) -= amount;
        let new_to = safe_add(self.balance_of(&to), amount)?;
        self.balances.insert(to, new_to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u64 = 100_000_000;

    fn engine() -> Address {
        [0xEEu8; 32]
    }

    fn alice() -> Address {
        [1u8; 32]
    }

    fn bob() -> Address {
        [2u8; 32]
    }

    fn ledger_with_balance(owner: Address, amount: u64) -> UsdLedger {
        let mut ledger = UsdLedger::new(engine());
        ledger.mint(engine(), owner, amount).unwrap();
        ledger
    }

    #[test]
    fn test_mint_requires_authority() {
        let mut ledger = UsdLedger::new(engine());
        let result = ledger.mint(alice(), alice(), 100 * ONE);
        assert!(matches!(result, Err(CdpError::Unauthorized { .. })));
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut ledger = UsdLedger::new(engine());
        ledger.mint(engine(), alice(), 360 * ONE).unwrap();
        assert_eq!(ledger.balance_of(&alice()), 360 * ONE);
        assert_eq!(ledger.total_supply(), 360 * ONE);

        ledger.burn(engine(), alice(), 60 * ONE).unwrap();
        assert_eq!(ledger.balance_of(&alice()), 300 * ONE);
        assert_eq!(ledger.total_supply(), 300 * ONE);
        assert_eq!(ledger.supply().total_minted, 360 * ONE);
        assert_eq!(ledger.supply().total_burned, 60 * ONE);
    }

    #[test]
    fn test_burn_insufficient_balance() {
        let mut ledger = ledger_with_balance(alice(), 10 * ONE);
        let result = ledger.burn(engine(), alice(), 11 * ONE);
        assert_eq!(
            result,
            Err(CdpError::InsufficientBalance {
                available: 10 * ONE,
                requested: 11 * ONE,
            })
        );
        assert_eq!(ledger.balance_of(&alice()), 10 * ONE);
    }

    #[test]
    fn test_mint_supply_cap() {
        let mut ledger = UsdLedger::new(engine());
        ledger.mint(engine(), alice(), token::MAX_SUPPLY).unwrap();
        let result = ledger.mint(engine(), bob(), 1);
        assert!(matches!(result, Err(CdpError::ExceedsMaximum { .. })));
    }

    #[test]
    fn test_transfer() {
        let mut ledger = ledger_with_balance(alice(), 100 * ONE);
        ledger.transfer(alice(), bob(), 40 * ONE).unwrap();
        assert_eq!(ledger.balance_of(&alice()), 60 * ONE);
        assert_eq!(ledger.balance_of(&bob()), 40 * ONE);

        // Supply is unaffected by transfers
        assert_eq!(ledger.total_supply(), 100 * ONE);
    }

    #[test]
    fn test_transfer_rejects_zero_and_self() {
        let mut ledger = ledger_with_balance(alice(), 100 * ONE);
        assert!(matches!(
            ledger.transfer(alice(), bob(), 0),
            Err(CdpError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ledger.transfer(alice(), alice(), ONE),
            Err(CdpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_transfer_from_allowance_semantics() {
        let mut ledger = ledger_with_balance(alice(), 100 * ONE);
        ledger.approve(alice(), engine(), 50 * ONE).unwrap();
        assert_eq!(ledger.allowance(&alice(), &engine()), 50 * ONE);

        // Allowance checked before balance
        let result = ledger.transfer_from(engine(), alice(), bob(), 60 * ONE);
        assert_eq!(
            result,
            Err(CdpError::InsufficientAllowance {
                allowance: 50 * ONE,
                requested: 60 * ONE,
            })
        );

        ledger.transfer_from(engine(), alice(), bob(), 30 * ONE).unwrap();
        assert_eq!(ledger.balance_of(&bob()), 30 * ONE);
        assert_eq!(ledger.allowance(&alice(), &engine()), 20 * ONE);
    }

    #[test]
    fn test_transfer_from_insufficient_balance() {
        let mut ledger = ledger_with_balance(alice(), 10 * ONE);
        ledger.approve(alice(), engine(), 100 * ONE).unwrap();

        let result = ledger.transfer_from(engine(), alice(), bob(), 20 * ONE);
        assert_eq!(
            result,
            Err(CdpError::InsufficientBalance {
                available: 10 * ONE,
                requested: 20 * ONE,
            })
        );
        // Failed call consumed no allowance
        assert_eq!(ledger.allowance(&alice(), &engine()), 100 * ONE);
    }

    #[test]
    fn test_approve_zero_clears() {
        let mut ledger = UsdLedger::new(engine());
        ledger.approve(alice(), bob(), 10 * ONE).unwrap();
        ledger.approve(alice(), bob(), 0).unwrap();
        assert_eq!(ledger.allowance(&alice(), &bob()), 0);
    }

    #[test]
    fn test_balances_sum_to_supply() {
        let mut ledger = ledger_with_balance(alice(), 100 * ONE);
        ledger.mint(engine(), bob(), 50 * ONE).unwrap();
        ledger.transfer(alice(), bob(), 25 * ONE).unwrap();
        ledger.burn(engine(), bob(), 10 * ONE).unwrap();

        let sum: u64 = ledger.holders().map(|(_, amount)| amount).sum();
        assert_eq!(sum, ledger.total_supply());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let mut ledger = ledger_with_balance(alice(), 100 * ONE);
        ledger.approve(alice(), engine(), 50 * ONE).unwrap();

        let mut bytes = Vec::new();
        ciborium::into_writer(&ledger, &mut bytes).unwrap();
        let restored: UsdLedger = ciborium::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(ledger, restored);
    }
}
