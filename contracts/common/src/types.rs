//! Core Types for the CDP Engine
//!
//! The fundamental data structures shared across the engine crates:
//! positions, margin-call auctions, oracle price data, and the engine
//! configuration.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for addresses (32-byte account identifier)
pub type Address = [u8; 32];

/// Type alias for auction identifiers
pub type AuctionId = [u8; 32];

// ============ Position Types ============

/// Status of a debt position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionStatus {
    /// Position is active and can be modified by its owner
    #[default]
    Active,
    /// Position is under an open margin-call auction; owner mutation is
    /// rejected until the auction settles or expires
    MarginCall,
}

/// Individual debt position state
///
/// One position per owner. Positions are created on first deposit and
/// never deleted; zeroed balances represent closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Position {
    /// Owner's address
    pub owner: Address,
    /// Collateral amount in base units (8 decimals)
    pub collateral: u64,
    /// Debt amount in token base units (8 decimals)
    pub debt: u64,
    /// Block height when the position was created
    pub opened_at: u64,
    /// Last modification block height
    pub last_updated: u64,
    /// Current status
    pub status: PositionStatus,
}

impl Position {
    /// Creates a new empty position
    pub fn new(owner: Address, block_height: u64) -> Self {
        Self {
            owner,
            collateral: 0,
            debt: 0,
            opened_at: block_height,
            last_updated: block_height,
            status: PositionStatus::Active,
        }
    }

    /// Returns true if the position accepts owner-driven mutation
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Returns true if the position has outstanding debt
    pub fn has_debt(&self) -> bool {
        self.debt > 0
    }
}

// ============ Oracle Types ============

/// Price source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PriceSource {
    /// Manually set price (dummy/test oracle)
    #[default]
    Manual,
    /// Relayed from an external price feed
    Feed,
}

/// Price data from the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceData {
    /// Debt-token value of one whole collateral unit, 8 decimals
    pub price: u64,
    /// Block height when the price was set
    pub updated_at_block: u64,
    /// Source of this update
    pub source: PriceSource,
}

impl PriceData {
    /// Creates a new price data entry
    pub fn new(price: u64, block: u64, source: PriceSource) -> Self {
        Self {
            price,
            updated_at_block: block,
            source,
        }
    }
}

// ============ Auction Types ============

/// Status of a margin-call auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AuctionStatus {
    /// Accepting bids (until the deadline), then settleable
    #[default]
    Open,
    /// Settled against the winning bid; terminal
    Settled,
    /// Bidding window closed with no bids; terminal
    Expired,
}

/// Margin-call auction against one undercollateralized position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Auction {
    /// Unique identifier for this auction
    pub id: AuctionId,
    /// Owner of the position being auctioned
    pub position_owner: Address,
    /// Oracle price snapshot at trigger time
    pub opened_at_price: u64,
    /// Block height when the auction was opened
    pub opened_at_block: u64,
    /// First block at which bidding is closed
    pub deadline_block: u64,
    /// Highest accepted bid so far (0 before any bid)
    pub highest_bid: u64,
    /// Bidder holding the highest bid
    pub highest_bidder: Option<Address>,
    /// Current status
    pub status: AuctionStatus,
}

impl Auction {
    /// Creates a freshly opened auction
    pub fn open(
        id: AuctionId,
        position_owner: Address,
        price: u64,
        block_height: u64,
        bid_window_blocks: u64,
    ) -> Self {
        Self {
            id,
            position_owner,
            opened_at_price: price,
            opened_at_block: block_height,
            deadline_block: block_height.saturating_add(bid_window_blocks),
            highest_bid: 0,
            highest_bidder: None,
            status: AuctionStatus::Open,
        }
    }

    /// Returns true if the auction is in the Open state
    pub fn is_open(&self) -> bool {
        self.status == AuctionStatus::Open
    }

    /// Returns true if at least one bid was accepted
    pub fn has_bids(&self) -> bool {
        self.highest_bidder.is_some()
    }

    /// Returns true if the bidding window has closed at the given block
    pub fn bidding_closed(&self, block_height: u64) -> bool {
        block_height >= self.deadline_block
    }
}

// ============ Engine Configuration ============

/// Per-instance engine configuration
///
/// The economically material parameters are deliberately configuration,
/// not constants: deployments differ on how aggressive liquidation should
/// be and how long bidders get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EngineConfig {
    /// Minimum collateral ratio in basis points; positions below it can be
    /// margin-called and requests that would drop below it are rejected
    pub min_collateral_ratio_bps: u64,
    /// Length of the auction bidding window in blocks
    pub bid_window_blocks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_collateral_ratio_bps: crate::constants::ratios::MIN_COLLATERAL_RATIO_BPS,
            bid_window_blocks: crate::constants::auction::BID_WINDOW_BLOCKS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_position_is_empty_and_active() {
        let pos = Position::new([7u8; 32], 100);
        assert_eq!(pos.collateral, 0);
        assert_eq!(pos.debt, 0);
        assert!(pos.is_active());
        assert!(!pos.has_debt());
    }

    #[test]
    fn test_auction_bidding_window() {
        let auction = Auction::open([1u8; 32], [2u8; 32], 200 * 100_000_000, 1000, 12);
        assert_eq!(auction.deadline_block, 1012);
        assert!(!auction.bidding_closed(1011));
        assert!(auction.bidding_closed(1012));
        assert!(auction.is_open());
        assert!(!auction.has_bids());
    }

    #[test]
    fn test_position_serialization_roundtrip() {
        let pos = Position {
            owner: [3u8; 32],
            collateral: 2 * 100_000_000,
            debt: 360 * 100_000_000,
            opened_at: 10,
            last_updated: 20,
            status: PositionStatus::MarginCall,
        };
        let bytes = borsh::to_vec(&pos).unwrap();
        let restored: Position = borsh::from_slice(&bytes).unwrap();
        assert_eq!(pos, restored);
    }
}
