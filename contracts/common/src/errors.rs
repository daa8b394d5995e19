//! Error Types for the CDP Engine
//!
//! Typed errors with context fields so callers and indexers can tell
//! exactly which precondition failed. Every engine operation performs all
//! of its checks before any mutation, so surfacing one of these means no
//! state was changed.

use crate::types::Address;

/// Result type alias for CDP operations
pub type CdpResult<T> = Result<T, CdpError>;

/// Main error enum for all CDP engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdpError {
    // ============ Authorization Errors ============
    /// Caller lacks the required role
    Unauthorized { expected: Address, actual: Address },

    // ============ Amount Errors ============
    /// Zero or otherwise malformed amount
    InvalidAmount { amount: u64 },

    /// Oracle price update with a non-positive price
    InvalidPrice { price: u64 },

    /// Amount exceeds a configured maximum
    ExceedsMaximum { amount: u64, maximum: u64 },

    /// Insufficient token or collateral balance
    InsufficientBalance { available: u64, requested: u64 },

    /// Spender allowance below the requested amount
    InsufficientAllowance { allowance: u64, requested: u64 },

    /// Repayment exceeds the position's outstanding debt
    ExcessRepayment { debt: u64, requested: u64 },

    // ============ Position Errors ============
    /// No position exists for the given owner
    PositionNotFound { owner: Address },

    /// Position is under an open margin call and rejects owner mutation
    PositionNotActive { owner: Address },

    /// Operation would leave the position below the minimum ratio
    UndercollateralizedRequest {
        current_ratio: u64,
        required_ratio: u64,
    },

    /// Position is at or above the minimum ratio; no margin call possible
    NotLiquidatable { owner: Address, ratio: u64 },

    // ============ Auction Errors ============
    /// Bid or settle attempted with no open auction for the position
    AuctionNotOpen { owner: Address },

    /// Trigger attempted while an auction is already open
    AuctionAlreadyOpen { owner: Address },

    /// Bid does not strictly exceed the current highest bid
    BidTooLow { bid: u64, highest: u64 },

    /// Settlement attempted before the bidding window closed
    BidWindowOpen { deadline: u64 },

    /// Bid attempted after the bidding window closed
    BidWindowClosed { deadline: u64 },

    // ============ Oracle Errors ============
    /// Oracle read before the first price was set
    Uninitialized,

    // ============ Concurrency Errors ============
    /// Another operation on the same position is still in flight
    OperationInProgress { owner: Address },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    InvalidInput { param: &'static str, reason: &'static str },
}

impl CdpError {
    /// Returns a stable error code for logging/indexing
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E001_UNAUTHORIZED",
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::InvalidPrice { .. } => "E011_INVALID_PRICE",
            Self::ExceedsMaximum { .. } => "E012_EXCEEDS_MAXIMUM",
            Self::InsufficientBalance { .. } => "E013_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E014_INSUFFICIENT_ALLOWANCE",
            Self::ExcessRepayment { .. } => "E015_EXCESS_REPAYMENT",
            Self::PositionNotFound { .. } => "E020_POSITION_NOT_FOUND",
            Self::PositionNotActive { .. } => "E021_POSITION_NOT_ACTIVE",
            Self::UndercollateralizedRequest { .. } => "E022_UNDERCOLLATERALIZED",
            Self::NotLiquidatable { .. } => "E023_NOT_LIQUIDATABLE",
            Self::AuctionNotOpen { .. } => "E030_AUCTION_NOT_OPEN",
            Self::AuctionAlreadyOpen { .. } => "E031_AUCTION_ALREADY_OPEN",
            Self::BidTooLow { .. } => "E032_BID_TOO_LOW",
            Self::BidWindowOpen { .. } => "E033_BID_WINDOW_OPEN",
            Self::BidWindowClosed { .. } => "E034_BID_WINDOW_CLOSED",
            Self::Uninitialized => "E040_ORACLE_UNINITIALIZED",
            Self::OperationInProgress { .. } => "E050_OPERATION_IN_PROGRESS",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidInput { .. } => "E090_INVALID_INPUT",
        }
    }

    /// Returns true if this error is recoverable (the caller can fix it
    /// and retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::UndercollateralizedRequest { .. } => true, // Add collateral
            Self::InsufficientBalance { .. } => true,        // Get more funds
            Self::InsufficientAllowance { .. } => true,      // Raise allowance
            Self::BidTooLow { .. } => true,                  // Bid higher
            Self::BidWindowOpen { .. } => true,              // Wait for window
            Self::OperationInProgress { .. } => true,        // Retry later
            Self::Uninitialized => true,                     // Wait for feed
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        // Ensure all error codes are unique
        let errors = [
            CdpError::Unauthorized {
                expected: [1u8; 32],
                actual: [2u8; 32],
            },
            CdpError::InvalidAmount { amount: 0 },
            CdpError::UndercollateralizedRequest {
                current_ratio: 10_000,
                required_ratio: 15_000,
            },
            CdpError::BidTooLow { bid: 5, highest: 10 },
            CdpError::Uninitialized,
            CdpError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(CdpError::BidTooLow { bid: 1, highest: 2 }.is_recoverable());
        assert!(!CdpError::Overflow.is_recoverable());
        assert!(!CdpError::AuctionNotOpen { owner: [0u8; 32] }.is_recoverable());
    }
}
