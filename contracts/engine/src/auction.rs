//! Margin-Call Auctions
//!
//! English auctions against undercollateralized positions. Each position
//! owner has at most one live auction; terminal auctions stay readable
//! until the next trigger replaces them.
//!
//! Bids must strictly exceed the current highest bid - ties are rejected
//! so a griefer cannot freeze an auction by matching it. Escrow movement
//! and refunds are the engine's job; this module owns the state machine
//! and the pure redistribution arithmetic.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use cdp_common::{
    errors::{CdpError, CdpResult},
    math::safe_add,
    types::{Address, Auction, AuctionId, AuctionStatus},
};

/// Derive a deterministic auction id from the position owner and the
/// block the auction opened at
pub fn derive_auction_id(owner: &Address, block_height: u64) -> AuctionId {
    let mut hasher = Sha256::new();
    hasher.update(owner);
    hasher.update(block_height.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

/// Book of margin-call auctions, keyed by position owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AuctionBook {
    auctions: BTreeMap<Address, Auction>,
}

impl AuctionBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest auction for a position owner, live or terminal
    pub fn get(&self, owner: &Address) -> Option<&Auction> {
        self.auctions.get(owner)
    }

    /// Latest auction, failing unless it is Open
    pub fn require_open(&self, owner: &Address) -> CdpResult<&Auction> {
        match self.auctions.get(owner) {
            Some(auction) if auction.is_open() => Ok(auction),
            _ => Err(CdpError::AuctionNotOpen { owner: *owner }),
        }
    }

    /// Open a fresh auction against a position
    ///
    /// A live auction for the same position blocks a new one; expired or
    /// settled auctions are replaced.
    pub(crate) fn open(
        &mut self,
        position_owner: Address,
        price: u64,
        block_height: u64,
        bid_window_blocks: u64,
    ) -> CdpResult<AuctionId> {
        if let Some(existing) = self.auctions.get(&position_owner) {
            if existing.is_open() {
                return Err(CdpError::AuctionAlreadyOpen {
                    owner: position_owner,
                });
            }
        }

        let id = derive_auction_id(&position_owner, block_height);
        let auction = Auction::open(id, position_owner, price, block_height, bid_window_blocks);
        self.auctions.insert(position_owner, auction);
        Ok(id)
    }

    /// Verify a bid without recording it: the auction must be Open, the
    /// bidding window still running, and the amount strictly above the
    /// current highest bid
    pub fn check_bid(&self, owner: &Address, amount: u64, block_height: u64) -> CdpResult<()> {
        let auction = self.require_open(owner)?;
        if auction.bidding_closed(block_height) {
            return Err(CdpError::BidWindowClosed {
                deadline: auction.deadline_block,
            });
        }
        if amount <= auction.highest_bid {
            return Err(CdpError::BidTooLow {
                bid: amount,
                highest: auction.highest_bid,
            });
        }
        Ok(())
    }

    /// Record a pre-checked bid, returning the outbid (bidder, amount)
    /// whose escrow must be refunded
    pub(crate) fn apply_bid(
        &mut self,
        owner: &Address,
        bidder: Address,
        amount: u64,
    ) -> Option<(Address, u64)> {
        let auction = self.auctions.get_mut(owner)?;
        let previous = auction
            .highest_bidder
            .map(|prev| (prev, auction.highest_bid));
        auction.highest_bid = amount;
        auction.highest_bidder = Some(bidder);
        previous
    }

    /// Transition an auction to Expired
    pub(crate) fn expire(&mut self, owner: &Address) {
        if let Some(auction) = self.auctions.get_mut(owner) {
            auction.status = AuctionStatus::Expired;
        }
    }

    /// Transition an auction to Settled
    pub(crate) fn settle(&mut self, owner: &Address) {
        if let Some(auction) = self.auctions.get_mut(owner) {
            auction.status = AuctionStatus::Settled;
        }
    }
}

/// Split a settlement shortfall across the surviving debt holders,
/// pro-rata by each holder's share of their combined debt
///
/// Pure function so the socialisation arithmetic is testable on its own.
/// Floor division leaves a rounding remainder; it is assigned to the
/// holder with the largest debt so the returned deltas sum to `shortfall`
/// exactly. Holders whose floor share is zero are omitted.
///
/// Returns an empty plan when there is nothing to distribute or nobody to
/// distribute to - the caller decides what an empty plan means.
pub fn redistribute_shortfall(
    shortfall: u64,
    holders: &[(Address, u64)],
) -> CdpResult<Vec<(Address, u64)>> {
    if shortfall == 0 || holders.is_empty() {
        return Ok(Vec::new());
    }

    let mut total_debt: u128 = 0;
    for (_, debt) in holders {
        total_debt += *debt as u128;
    }
    if total_debt == 0 {
        return Ok(Vec::new());
    }

    let mut shares: Vec<(Address, u64)> = Vec::with_capacity(holders.len());
    let mut distributed: u64 = 0;
    let mut largest: Option<(usize, u64)> = None;

    for (owner, debt) in holders {
        let share = ((shortfall as u128 * *debt as u128) / total_debt) as u64;
        match largest {
            Some((_, debt_so_far)) if debt_so_far >= *debt => {}
            _ => largest = Some((shares.len(), *debt)),
        }
        shares.push((*owner, share));
        distributed = safe_add(distributed, share)?;
    }

    // Floor division cannot overshoot
    let remainder = shortfall - distributed;
    if remainder > 0 {
        if let Some((index, _)) = largest {
            shares[index].1 = safe_add(shares[index].1, remainder)?;
        }
    }

    shares.retain(|(_, share)| *share > 0);
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u64 = 100_000_000;
    const PRICE_100: u64 = 100 * ONE;

    fn owner() -> Address {
        [1u8; 32]
    }

    fn bidder_a() -> Address {
        [2u8; 32]
    }

    fn bidder_b() -> Address {
        [3u8; 32]
    }

    fn open_book() -> AuctionBook {
        let mut book = AuctionBook::new();
        book.open(owner(), PRICE_100, 1000, 12).unwrap();
        book
    }

    #[test]
    fn test_auction_ids_are_distinct() {
        let id_a = derive_auction_id(&owner(), 1000);
        let id_b = derive_auction_id(&owner(), 1001);
        let id_c = derive_auction_id(&bidder_a(), 1000);
        assert_ne!(id_a, id_b);
        assert_ne!(id_a, id_c);
    }

    #[test]
    fn test_open_blocks_second_auction() {
        let mut book = open_book();
        let result = book.open(owner(), PRICE_100, 1001, 12);
        assert_eq!(result, Err(CdpError::AuctionAlreadyOpen { owner: owner() }));
    }

    #[test]
    fn test_reopen_after_terminal_state() {
        let mut book = open_book();
        book.expire(&owner());
        let id = book.open(owner(), PRICE_100, 1020, 12).unwrap();
        let auction = book.get(&owner()).unwrap();
        assert_eq!(auction.id, id);
        assert!(auction.is_open());
        assert_eq!(auction.opened_at_block, 1020);
    }

    #[test]
    fn test_bids_must_strictly_increase() {
        let mut book = open_book();

        // First bid only has to beat the initial 0
        book.check_bid(&owner(), 10 * ONE, 1001).unwrap();
        assert_eq!(book.apply_bid(&owner(), bidder_a(), 10 * ONE), None);

        // An equal bid is rejected
        assert_eq!(
            book.check_bid(&owner(), 10 * ONE, 1002),
            Err(CdpError::BidTooLow {
                bid: 10 * ONE,
                highest: 10 * ONE,
            })
        );

        // A higher bid displaces the previous bidder
        book.check_bid(&owner(), 11 * ONE, 1002).unwrap();
        let previous = book.apply_bid(&owner(), bidder_b(), 11 * ONE);
        assert_eq!(previous, Some((bidder_a(), 10 * ONE)));

        let auction = book.get(&owner()).unwrap();
        assert_eq!(auction.highest_bid, 11 * ONE);
        assert_eq!(auction.highest_bidder, Some(bidder_b()));
    }

    #[test]
    fn test_zero_bid_rejected() {
        let book = open_book();
        assert_eq!(
            book.check_bid(&owner(), 0, 1001),
            Err(CdpError::BidTooLow { bid: 0, highest: 0 })
        );
    }

    #[test]
    fn test_bid_after_window_rejected() {
        let book = open_book();
        assert_eq!(
            book.check_bid(&owner(), ONE, 1012),
            Err(CdpError::BidWindowClosed { deadline: 1012 })
        );
    }

    #[test]
    fn test_bid_requires_open_auction() {
        let mut book = open_book();
        book.settle(&owner());
        assert_eq!(
            book.check_bid(&owner(), ONE, 1001),
            Err(CdpError::AuctionNotOpen { owner: owner() })
        );
    }

    // ============ Redistribution ============

    #[test]
    fn test_redistribution_proportional() {
        let holders = vec![(bidder_a(), 300 * ONE), (bidder_b(), 100 * ONE)];
        let plan = redistribute_shortfall(200 * ONE, &holders).unwrap();

        assert_eq!(
            plan,
            vec![(bidder_a(), 150 * ONE), (bidder_b(), 50 * ONE)]
        );
    }

    #[test]
    fn test_redistribution_sums_exactly() {
        // 100 split over debts 1/1/1 leaves a remainder of 1, which goes
        // to the first of the equally-largest holders
        let holders = vec![([1u8; 32], 1), ([2u8; 32], 1), ([3u8; 32], 1)];
        let plan = redistribute_shortfall(100, &holders).unwrap();

        let total: u64 = plan.iter().map(|(_, share)| share).sum();
        assert_eq!(total, 100);
        assert_eq!(plan[0], ([1u8; 32], 34));
        assert_eq!(plan[1], ([2u8; 32], 33));
        assert_eq!(plan[2], ([3u8; 32], 33));
    }

    #[test]
    fn test_redistribution_remainder_to_largest() {
        let holders = vec![([1u8; 32], 10), ([2u8; 32], 70), ([3u8; 32], 20)];
        let plan = redistribute_shortfall(101, &holders).unwrap();

        let total: u64 = plan.iter().map(|(_, share)| share).sum();
        assert_eq!(total, 101);
        // Floor shares are 10/70/20; the extra unit lands on the holder
        // with debt 70
        assert_eq!(plan, vec![([1u8; 32], 10), ([2u8; 32], 71), ([3u8; 32], 20)]);
    }

    #[test]
    fn test_redistribution_drops_zero_shares() {
        // A dust holder whose floor share is zero is omitted entirely
        let holders = vec![([1u8; 32], 1), ([2u8; 32], 1_000_000)];
        let plan = redistribute_shortfall(10, &holders).unwrap();

        assert_eq!(plan, vec![([2u8; 32], 10)]);
    }

    #[test]
    fn test_redistribution_empty_cases() {
        assert!(redistribute_shortfall(0, &[(owner(), ONE)]).unwrap().is_empty());
        assert!(redistribute_shortfall(ONE, &[]).unwrap().is_empty());
    }
}
