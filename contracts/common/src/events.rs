//! Protocol Events for the CDP Engine
//!
//! Events are emitted during engine execution and can be drained by an
//! off-core indexer for building UIs, analytics, and the breach-discovery
//! watchers that feed `trigger_margin_call`.

use crate::types::{Address, AuctionId, PriceSource};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    CollateralDeposited = 0x01,
    CollateralWithdrawn = 0x02,
    DebtWithdrawn = 0x03,
    DebtRepaid = 0x04,

    // Auction Events (0x20 - 0x3F)
    MarginCallTriggered = 0x20,
    BidPlaced = 0x21,
    BidRefunded = 0x22,
    AuctionSettled = 0x23,
    AuctionExpired = 0x24,
    ShortfallSocialised = 0x25,

    // Token Events (0x40 - 0x5F)
    TokenTransfer = 0x40,
    TokenApproval = 0x41,
    TokenMint = 0x42,
    TokenBurn = 0x43,

    // Oracle Events (0x60 - 0x7F)
    PriceUpdated = 0x60,
    FeederChanged = 0x61,
}

/// Main event enum containing all engine events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum CdpEvent {
    // ============ Position Events ============

    /// Emitted when collateral is deposited into a position
    CollateralDeposited {
        owner: Address,
        amount: u64,
        new_collateral: u64,
        block_height: u64,
    },

    /// Emitted when collateral is withdrawn from a position
    CollateralWithdrawn {
        owner: Address,
        amount: u64,
        new_collateral: u64,
        new_ratio: u64,
        block_height: u64,
    },

    /// Emitted when debt is withdrawn (minted) against a position
    DebtWithdrawn {
        owner: Address,
        amount: u64,
        new_debt: u64,
        new_ratio: u64,
        block_height: u64,
    },

    /// Emitted when debt is repaid (burned)
    DebtRepaid {
        owner: Address,
        amount: u64,
        new_debt: u64,
        block_height: u64,
    },

    // ============ Auction Events ============

    /// Emitted when a margin call opens an auction
    MarginCallTriggered {
        auction_id: AuctionId,
        owner: Address,
        caller: Address,
        ratio: u64,
        price: u64,
        deadline_block: u64,
        block_height: u64,
    },

    /// Emitted when a bid is accepted as the new highest
    BidPlaced {
        auction_id: AuctionId,
        bidder: Address,
        amount: u64,
        previous_bid: u64,
        block_height: u64,
    },

    /// Emitted when an outbid bidder's escrow is returned
    BidRefunded {
        auction_id: AuctionId,
        bidder: Address,
        amount: u64,
        block_height: u64,
    },

    /// Emitted when an auction settles against the winning bid
    AuctionSettled {
        auction_id: AuctionId,
        owner: Address,
        winner: Address,
        winning_bid: u64,
        debt_cleared: u64,
        collateral_seized: u64,
        shortfall: u64,
        block_height: u64,
    },

    /// Emitted when an auction expires with no bids
    AuctionExpired {
        auction_id: AuctionId,
        owner: Address,
        block_height: u64,
    },

    /// Emitted when a settlement shortfall is spread across the other
    /// open positions
    ShortfallSocialised {
        auction_id: AuctionId,
        shortfall: u64,
        recipients: u32,
        block_height: u64,
    },

    // ============ Token Events ============

    /// Emitted on a token transfer
    TokenTransfer {
        from: Address,
        to: Address,
        amount: u64,
        block_height: u64,
    },

    /// Emitted when an allowance is set
    TokenApproval {
        owner: Address,
        spender: Address,
        amount: u64,
        block_height: u64,
    },

    /// Emitted when tokens are minted
    TokenMint {
        to: Address,
        amount: u64,
        new_total_supply: u64,
        block_height: u64,
    },

    /// Emitted when tokens are burned
    TokenBurn {
        from: Address,
        amount: u64,
        new_total_supply: u64,
        block_height: u64,
    },

    // ============ Oracle Events ============

    /// Emitted when the oracle price is replaced
    PriceUpdated {
        old_price: Option<u64>,
        new_price: u64,
        source: PriceSource,
        block_height: u64,
    },

    /// Emitted when the feeder role is handed off
    FeederChanged {
        old_feeder: Address,
        new_feeder: Address,
        block_height: u64,
    },
}

impl CdpEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CollateralDeposited { .. } => EventType::CollateralDeposited,
            Self::CollateralWithdrawn { .. } => EventType::CollateralWithdrawn,
            Self::DebtWithdrawn { .. } => EventType::DebtWithdrawn,
            Self::DebtRepaid { .. } => EventType::DebtRepaid,
            Self::MarginCallTriggered { .. } => EventType::MarginCallTriggered,
            Self::BidPlaced { .. } => EventType::BidPlaced,
            Self::BidRefunded { .. } => EventType::BidRefunded,
            Self::AuctionSettled { .. } => EventType::AuctionSettled,
            Self::AuctionExpired { .. } => EventType::AuctionExpired,
            Self::ShortfallSocialised { .. } => EventType::ShortfallSocialised,
            Self::TokenTransfer { .. } => EventType::TokenTransfer,
            Self::TokenApproval { .. } => EventType::TokenApproval,
            Self::TokenMint { .. } => EventType::TokenMint,
            Self::TokenBurn { .. } => EventType::TokenBurn,
            Self::PriceUpdated { .. } => EventType::PriceUpdated,
            Self::FeederChanged { .. } => EventType::FeederChanged,
        }
    }

    /// Get the block height when the event occurred
    pub fn block_height(&self) -> u64 {
        match self {
            Self::CollateralDeposited { block_height, .. } => *block_height,
            Self::CollateralWithdrawn { block_height, .. } => *block_height,
            Self::DebtWithdrawn { block_height, .. } => *block_height,
            Self::DebtRepaid { block_height, .. } => *block_height,
            Self::MarginCallTriggered { block_height, .. } => *block_height,
            Self::BidPlaced { block_height, .. } => *block_height,
            Self::BidRefunded { block_height, .. } => *block_height,
            Self::AuctionSettled { block_height, .. } => *block_height,
            Self::AuctionExpired { block_height, .. } => *block_height,
            Self::ShortfallSocialised { block_height, .. } => *block_height,
            Self::TokenTransfer { block_height, .. } => *block_height,
            Self::TokenApproval { block_height, .. } => *block_height,
            Self::TokenMint { block_height, .. } => *block_height,
            Self::TokenBurn { block_height, .. } => *block_height,
            Self::PriceUpdated { block_height, .. } => *block_height,
            Self::FeederChanged { block_height, .. } => *block_height,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<CdpEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: CdpEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[CdpEvent] {
        &self.events
    }

    /// Take ownership of all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<CdpEvent> {
        core::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&CdpEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = CdpEvent::BidPlaced {
            auction_id: [1u8; 32],
            bidder: [2u8; 32],
            amount: 10_00000000,
            previous_bid: 0,
            block_height: 100,
        };

        assert_eq!(event.event_type(), EventType::BidPlaced);
        assert_eq!(event.block_height(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = CdpEvent::AuctionSettled {
            auction_id: [1u8; 32],
            owner: [2u8; 32],
            winner: [3u8; 32],
            winning_bid: 10_00000000,
            debt_cleared: 10_00000000,
            collateral_seized: 2_00000000,
            shortfall: 350_00000000,
            block_height: 200,
        };

        let bytes = event.to_bytes();
        let restored = CdpEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log_filtering() {
        let mut log = EventLog::new();

        log.emit(CdpEvent::PriceUpdated {
            old_price: None,
            new_price: 200_00000000,
            source: PriceSource::Manual,
            block_height: 1,
        });
        log.emit(CdpEvent::CollateralDeposited {
            owner: [2u8; 32],
            amount: 2_00000000,
            new_collateral: 2_00000000,
            block_height: 2,
        });

        assert_eq!(log.len(), 2);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::PriceUpdated).len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }
}
