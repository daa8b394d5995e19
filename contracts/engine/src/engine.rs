//! CDP Engine Façade
//!
//! The single entry point external callers use. Sequences the price
//! oracle, the position ledger, the USD token ledger, and the auction
//! book under a per-call check-then-apply discipline: every precondition
//! of an operation is verified before the first mutation, so a returned
//! error means no observable state change.
//!
//! The engine's own address is the token ledger's mint/burn authority and
//! the escrow account holding reserved bids.

use std::collections::BTreeSet;

use cdp_common::{
    errors::{CdpError, CdpResult},
    events::{CdpEvent, EventLog},
    math::{collateral_ratio_bps, is_undercollateralized, safe_add},
    ratios,
    types::{Address, Auction, AuctionId, EngineConfig, PositionStatus, PriceData, PriceSource},
};
use cdp_oracle::PriceOracle;
use cdp_token::UsdLedger;

use crate::auction::{redistribute_shortfall, AuctionBook};
use crate::positions::PositionLedger;

// ============ Reentrancy Guards ============

/// Explicit per-position in-progress flags
///
/// While an operation keyed on a position is in flight, no nested
/// operation on the same position is admitted. The flag is set before the
/// first component call and cleared on every exit path.
#[derive(Debug, Clone, Default)]
pub struct OpGuards {
    in_flight: BTreeSet<Address>,
}

impl OpGuards {
    /// Mark a position busy, rejecting if it already is
    pub fn enter(&mut self, owner: Address) -> CdpResult<()> {
        if !self.in_flight.insert(owner) {
            return Err(CdpError::OperationInProgress { owner });
        }
        Ok(())
    }

    /// Clear a position's busy flag
    pub fn exit(&mut self, owner: &Address) {
        self.in_flight.remove(owner);
    }

    /// Returns true if an operation on the position is in flight
    pub fn is_busy(&self, owner: &Address) -> bool {
        self.in_flight.contains(owner)
    }
}

// ============ Settlement Results ============

/// Details of a completed auction settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The settled auction
    pub auction_id: AuctionId,
    /// Winning bidder
    pub winner: Address,
    /// The winning bid (fully escrowed at this point)
    pub winning_bid: u64,
    /// Debt burned out of existence (min of bid and outstanding debt)
    pub debt_cleared: u64,
    /// Collateral handed to the winner
    pub collateral_seized: u64,
    /// Debt the bid did not cover, socialized across other positions
    pub shortfall: u64,
    /// Escrow returned to the winner when the bid exceeded the debt
    pub excess_refunded: u64,
}

/// Outcome of a `settle_margin_call` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The auction settled against the winning bid
    Settled(Settlement),
    /// The bidding window closed with no bids; the auction expired
    Expired,
}

// ============ Engine ============

/// The collateralized-debt engine
#[derive(Debug, Clone)]
pub struct CdpEngine {
    /// The engine's own account: token authority and bid escrow
    address: Address,
    config: EngineConfig,
    oracle: PriceOracle,
    token: UsdLedger,
    positions: PositionLedger,
    auctions: AuctionBook,
    guards: OpGuards,
    /// Shortfall with no surviving debt holder to absorb it
    bad_debt: u64,
    events: EventLog,
}

impl CdpEngine {
    /// Create an engine, wiring its own address into the token ledger as
    /// the mint/burn authority
    pub fn new(address: Address, feeder: Address, config: EngineConfig) -> Self {
        Self {
            address,
            config,
            oracle: PriceOracle::new(feeder),
            token: UsdLedger::new(address),
            positions: PositionLedger::new(),
            auctions: AuctionBook::new(),
            guards: OpGuards::default(),
            bad_debt: 0,
            events: EventLog::new(),
        }
    }

    // ============ Reads ============

    /// The engine's own address
    pub fn address(&self) -> Address {
        self.address
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The token ledger
    pub fn token(&self) -> &UsdLedger {
        &self.token
    }

    /// The position ledger
    pub fn positions(&self) -> &PositionLedger {
        &self.positions
    }

    /// The auction book
    pub fn auctions(&self) -> &AuctionBook {
        &self.auctions
    }

    /// Latest oracle price
    pub fn price(&self) -> CdpResult<u64> {
        self.oracle.price()
    }

    /// Latest oracle datum
    pub fn latest_price(&self) -> Option<&PriceData> {
        self.oracle.latest()
    }

    /// A position's current collateral ratio in basis points
    ///
    /// `RATIO_INFINITE` for debt-free positions (no oracle read needed).
    pub fn current_ratio(&self, owner: &Address) -> CdpResult<u64> {
        let position = self.positions.require(owner)?;
        if !position.has_debt() {
            return Ok(ratios::RATIO_INFINITE);
        }
        let price = self.oracle.price()?;
        collateral_ratio_bps(position.collateral, position.debt, price)
    }

    /// Latest auction for a position, live or terminal
    pub fn auction(&self, owner: &Address) -> Option<&Auction> {
        self.auctions.get(owner)
    }

    /// Token balance of an account
    pub fn balance_of(&self, owner: &Address) -> u64 {
        self.token.balance_of(owner)
    }

    /// Token allowance from `owner` to `spender`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.token.allowance(owner, spender)
    }

    /// Total token supply
    pub fn total_supply(&self) -> u64 {
        self.token.total_supply()
    }

    /// Total debt across all positions
    pub fn total_debt(&self) -> u64 {
        self.positions.total_debt()
    }

    /// Total collateral across all positions
    pub fn total_collateral(&self) -> u64 {
        self.positions.total_collateral()
    }

    /// Shortfall that had no surviving debt holder to absorb it
    pub fn bad_debt(&self) -> u64 {
        self.bad_debt
    }

    /// Events emitted so far
    pub fn events(&self) -> &[CdpEvent] {
        self.events.events()
    }

    /// Drain the event log (for an external indexer)
    pub fn take_events(&mut self) -> Vec<CdpEvent> {
        self.events.drain()
    }

    // ============ Oracle Operations ============

    /// Replace the oracle price (feeder only)
    pub fn set_price(&mut self, caller: Address, price: u64, block_height: u64) -> CdpResult<()> {
        self.set_price_from(caller, price, PriceSource::Manual, block_height)
    }

    /// Replace the oracle price with an explicit source tag (feeder only)
    pub fn set_price_from(
        &mut self,
        caller: Address,
        price: u64,
        source: PriceSource,
        block_height: u64,
    ) -> CdpResult<()> {
        let old_price = self.oracle.latest().map(|p| p.price);
        self.oracle.set_price_from(caller, price, source, block_height)?;
        self.events.emit(CdpEvent::PriceUpdated {
            old_price,
            new_price: price,
            source,
            block_height,
        });
        Ok(())
    }

    /// Hand the feeder role to a new address (current feeder only)
    pub fn rotate_feeder(
        &mut self,
        caller: Address,
        new_feeder: Address,
        block_height: u64,
    ) -> CdpResult<()> {
        let old_feeder = self.oracle.feeder();
        self.oracle.rotate_feeder(caller, new_feeder)?;
        self.events.emit(CdpEvent::FeederChanged {
            old_feeder,
            new_feeder,
            block_height,
        });
        Ok(())
    }

    // ============ Token Operations ============

    /// Transfer tokens from the caller to another account
    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.token.transfer(caller, to, amount)?;
        self.events.emit(CdpEvent::TokenTransfer {
            from: caller,
            to,
            amount,
            block_height,
        });
        Ok(())
    }

    /// Set the caller's allowance for a spender
    ///
    /// Bidders approve the engine address before `bid_margin_call` so the
    /// engine can escrow their bid.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.token.approve(caller, spender, amount)?;
        self.events.emit(CdpEvent::TokenApproval {
            owner: caller,
            spender,
            amount,
            block_height,
        });
        Ok(())
    }

    /// Transfer tokens on behalf of another account, consuming allowance
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.token.transfer_from(caller, from, to, amount)?;
        self.events.emit(CdpEvent::TokenTransfer {
            from,
            to,
            amount,
            block_height,
        });
        Ok(())
    }

    // ============ Position Operations ============

    /// Deposit collateral into the caller's position
    pub fn deposit_collateral(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.guards.enter(caller)?;
        let result = self.deposit_collateral_inner(caller, amount, block_height);
        self.guards.exit(&caller);
        result
    }

    fn deposit_collateral_inner(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        let new_collateral = self.positions.deposit(caller, amount, block_height)?;
        self.events.emit(CdpEvent::CollateralDeposited {
            owner: caller,
            amount,
            new_collateral,
            block_height,
        });
        Ok(())
    }

    /// Withdraw free collateral from the caller's position
    pub fn withdraw_collateral(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.guards.enter(caller)?;
        let result = self.withdraw_collateral_inner(caller, amount, block_height);
        self.guards.exit(&caller);
        result
    }

    fn withdraw_collateral_inner(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        // The ratio check only binds when debt is outstanding; a debt-free
        // withdrawal must not require an initialized oracle
        let price = if self.positions.require(&caller)?.has_debt() {
            self.oracle.price()?
        } else {
            0
        };

        let (new_collateral, new_ratio) = self.positions.withdraw_collateral(
            caller,
            amount,
            price,
            self.config.min_collateral_ratio_bps,
            block_height,
        )?;
        self.events.emit(CdpEvent::CollateralWithdrawn {
            owner: caller,
            amount,
            new_collateral,
            new_ratio,
            block_height,
        });
        Ok(())
    }

    /// Withdraw debt tokens against the caller's collateral
    ///
    /// The resulting ratio is verified before anything is applied; on
    /// success the tokens are minted to the caller.
    pub fn withdraw_debt(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.guards.enter(caller)?;
        let result = self.withdraw_debt_inner(caller, amount, block_height);
        self.guards.exit(&caller);
        result
    }

    fn withdraw_debt_inner(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        let price = self.oracle.price()?;
        if !self.token.supply().can_mint(amount) {
            return Err(CdpError::ExceedsMaximum {
                amount,
                maximum: cdp_common::token::MAX_SUPPLY.saturating_sub(self.token.total_supply()),
            });
        }

        let (new_debt, new_ratio) = self.positions.increase_debt(
            caller,
            amount,
            price,
            self.config.min_collateral_ratio_bps,
            block_height,
        )?;
        // Cannot fail: authority, amount, and supply cap were checked above
        self.token.mint(self.address, caller, amount)?;

        self.events.emit(CdpEvent::TokenMint {
            to: caller,
            amount,
            new_total_supply: self.token.total_supply(),
            block_height,
        });
        self.events.emit(CdpEvent::DebtWithdrawn {
            owner: caller,
            amount,
            new_debt,
            new_ratio,
            block_height,
        });
        Ok(())
    }

    /// Repay debt by burning tokens from the caller's balance
    pub fn repay_debt(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.guards.enter(caller)?;
        let result = self.repay_debt_inner(caller, amount, block_height);
        self.guards.exit(&caller);
        result
    }

    fn repay_debt_inner(
        &mut self,
        caller: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        let position = self.positions.require_active(&caller)?;
        if amount > position.debt {
            return Err(CdpError::ExcessRepayment {
                debt: position.debt,
                requested: amount,
            });
        }
        self.token.check_balance(&caller, amount)?;

        // Cannot fail: balance was checked above
        self.token.burn(self.address, caller, amount)?;
        let new_debt = self.positions.decrease_debt(caller, amount, block_height)?;

        self.events.emit(CdpEvent::TokenBurn {
            from: caller,
            amount,
            new_total_supply: self.token.total_supply(),
            block_height,
        });
        self.events.emit(CdpEvent::DebtRepaid {
            owner: caller,
            amount,
            new_debt,
            block_height,
        });
        Ok(())
    }

    // ============ Margin-Call Operations ============

    /// Open a margin-call auction against an undercollateralized position
    ///
    /// Callable by anyone - liquidation is a public good. The caller
    /// names the position; the engine verifies the breach for that one
    /// position only, so discovery stays with off-core watchers and the
    /// check stays O(1).
    pub fn trigger_margin_call(
        &mut self,
        caller: Address,
        position_owner: Address,
        block_height: u64,
    ) -> CdpResult<AuctionId> {
        self.guards.enter(position_owner)?;
        let result = self.trigger_margin_call_inner(caller, position_owner, block_height);
        self.guards.exit(&position_owner);
        result
    }

    fn trigger_margin_call_inner(
        &mut self,
        caller: Address,
        position_owner: Address,
        block_height: u64,
    ) -> CdpResult<AuctionId> {
        let price = self.oracle.price()?;
        self.expire_dead_auction(&position_owner, block_height);

        let position = self.positions.require(&position_owner)?;
        let ratio = collateral_ratio_bps(position.collateral, position.debt, price)?;
        if !is_undercollateralized(ratio, self.config.min_collateral_ratio_bps) {
            return Err(CdpError::NotLiquidatable {
                owner: position_owner,
                ratio,
            });
        }

        let auction_id = self.auctions.open(
            position_owner,
            price,
            block_height,
            self.config.bid_window_blocks,
        )?;
        self.positions
            .set_status(&position_owner, PositionStatus::MarginCall);

        self.events.emit(CdpEvent::MarginCallTriggered {
            auction_id,
            owner: position_owner,
            caller,
            ratio,
            price,
            deadline_block: block_height.saturating_add(self.config.bid_window_blocks),
            block_height,
        });
        Ok(auction_id)
    }

    /// Bid on an open margin-call auction
    ///
    /// The bid amount is reserved from the bidder's token balance into
    /// the engine's escrow (the bidder must have approved the engine
    /// address), and the previous highest bidder is refunded in the same
    /// atomic step.
    pub fn bid_margin_call(
        &mut self,
        caller: Address,
        position_owner: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.guards.enter(position_owner)?;
        let result = self.bid_margin_call_inner(caller, position_owner, amount, block_height);
        self.guards.exit(&position_owner);
        result
    }

    fn bid_margin_call_inner(
        &mut self,
        caller: Address,
        position_owner: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        self.expire_dead_auction(&position_owner, block_height);
        self.auctions.check_bid(&position_owner, amount, block_height)?;
        self.token.check_transfer_from(&self.address, &caller, amount)?;

        let auction_id = match self.auctions.get(&position_owner) {
            Some(auction) => auction.id,
            None => return Err(CdpError::AuctionNotOpen { owner: position_owner }),
        };

        // All checks passed; move the escrow, record the bid, refund the
        // outbid escrow
        self.token
            .transfer_from(self.address, caller, self.address, amount)?;
        let previous_bid = self
            .auctions
            .get(&position_owner)
            .map(|a| a.highest_bid)
            .unwrap_or(0);
        let outbid = self.auctions.apply_bid(&position_owner, caller, amount);
        if let Some((prev_bidder, prev_amount)) = outbid {
            self.token.transfer(self.address, prev_bidder, prev_amount)?;
            self.events.emit(CdpEvent::BidRefunded {
                auction_id,
                bidder: prev_bidder,
                amount: prev_amount,
                block_height,
            });
        }

        self.events.emit(CdpEvent::BidPlaced {
            auction_id,
            bidder: caller,
            amount,
            previous_bid,
            block_height,
        });
        Ok(())
    }

    /// Settle (or expire) a margin-call auction after its bidding window
    ///
    /// Callable by anyone once the window closed. With no bids the
    /// auction expires and the position returns to its owner; the breach
    /// can be re-triggered later. With bids: the winning escrow pays the
    /// debt down, the collateral moves to the winner's position, and any
    /// uncovered debt is socialized pro-rata across the other open
    /// positions. Recipients pushed below the minimum ratio by the
    /// redistribution are left for later triggers - no cascade inside one
    /// settlement.
    pub fn settle_margin_call(
        &mut self,
        caller: Address,
        position_owner: Address,
        block_height: u64,
    ) -> CdpResult<SettleOutcome> {
        self.guards.enter(position_owner)?;
        let result = self.settle_margin_call_inner(caller, position_owner, block_height);
        self.guards.exit(&position_owner);
        result
    }

    fn settle_margin_call_inner(
        &mut self,
        _caller: Address,
        position_owner: Address,
        block_height: u64,
    ) -> CdpResult<SettleOutcome> {
        let auction = self.auctions.require_open(&position_owner)?;
        if !auction.bidding_closed(block_height) {
            return Err(CdpError::BidWindowOpen {
                deadline: auction.deadline_block,
            });
        }

        let auction_id = auction.id;
        let (winner, winning_bid) = match auction.highest_bidder {
            Some(winner) => (winner, auction.highest_bid),
            None => {
                // No bids: expire, hand the position back
                self.auctions.expire(&position_owner);
                self.positions
                    .set_status(&position_owner, PositionStatus::Active);
                self.events.emit(CdpEvent::AuctionExpired {
                    auction_id,
                    owner: position_owner,
                    block_height,
                });
                return Ok(SettleOutcome::Expired);
            }
        };

        let debt = self.positions.require(&position_owner)?.debt;

        let debt_cleared = winning_bid.min(debt);
        let excess_refunded = winning_bid - debt_cleared;
        let shortfall = debt - debt_cleared;

        // Plan the redistribution before mutating anything
        let holders = self.positions.debt_holders_except(&position_owner);
        let plan = redistribute_shortfall(shortfall, &holders)?;
        for (owner, share) in &plan {
            let recipient = self.positions.require(owner)?;
            safe_add(recipient.debt, *share)?;
        }
        safe_add(self.positions.total_debt(), shortfall)?;
        self.token.check_balance(&self.address, winning_bid)?;

        // Apply: escrow first, then the position, then the socialized debt
        if debt_cleared > 0 {
            self.token.burn(self.address, self.address, debt_cleared)?;
            self.events.emit(CdpEvent::TokenBurn {
                from: self.address,
                amount: debt_cleared,
                new_total_supply: self.token.total_supply(),
                block_height,
            });
        }
        if excess_refunded > 0 {
            self.token.transfer(self.address, winner, excess_refunded)?;
            self.events.emit(CdpEvent::TokenTransfer {
                from: self.address,
                to: winner,
                amount: excess_refunded,
                block_height,
            });
        }

        let (collateral_seized, _) = self.positions.seize(&position_owner, block_height);
        self.positions
            .credit_collateral(winner, collateral_seized, block_height)?;

        for (owner, share) in &plan {
            self.positions.apply_debt_delta(owner, *share, block_height)?;
        }
        if shortfall > 0 && plan.is_empty() {
            // Nobody left to absorb the loss; track it as system bad debt
            self.bad_debt = safe_add(self.bad_debt, shortfall)?;
        }

        self.auctions.settle(&position_owner);

        if shortfall > 0 && !plan.is_empty() {
            self.events.emit(CdpEvent::ShortfallSocialised {
                auction_id,
                shortfall,
                recipients: plan.len() as u32,
                block_height,
            });
        }
        self.events.emit(CdpEvent::AuctionSettled {
            auction_id,
            owner: position_owner,
            winner,
            winning_bid,
            debt_cleared,
            collateral_seized,
            shortfall,
            block_height,
        });

        Ok(SettleOutcome::Settled(Settlement {
            auction_id,
            winner,
            winning_bid,
            debt_cleared,
            collateral_seized,
            shortfall,
            excess_refunded,
        }))
    }

    /// Lazily expire an open auction whose window closed with no bids
    fn expire_dead_auction(&mut self, position_owner: &Address, block_height: u64) {
        let dead = match self.auctions.get(position_owner) {
            Some(a) => a.is_open() && a.bidding_closed(block_height) && !a.has_bids(),
            None => false,
        };
        if dead {
            let auction_id = match self.auctions.get(position_owner) {
                Some(a) => a.id,
                None => return,
            };
            self.auctions.expire(position_owner);
            self.positions
                .set_status(position_owner, PositionStatus::Active);
            self.events.emit(CdpEvent::AuctionExpired {
                auction_id,
                owner: *position_owner,
                block_height,
            });
        }
    }
}
