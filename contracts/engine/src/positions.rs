//! Debt Position Ledger
//!
//! Per-account collateral and debt balances with the collateralization
//! pre-checks. One position per owner, created on first deposit and never
//! deleted - zeroed balances represent closure.
//!
//! The safety-critical ordering lives here: any operation that raises
//! debt or lowers collateral computes the *resulting* ratio first and
//! rejects before applying, so the ledger never passes through an
//! invariant-violating intermediate state.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use cdp_common::{
    errors::{CdpError, CdpResult},
    math::{collateral_ratio_bps, is_undercollateralized, safe_add},
    types::{Address, Position, PositionStatus},
};

/// Ledger of all debt positions plus system-wide aggregates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionLedger {
    /// One position per owner
    positions: BTreeMap<Address, Position>,
    /// Total collateral across all positions
    total_collateral: u64,
    /// Total debt across all positions
    total_debt: u64,
}

impl PositionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Reads ============

    /// Look up a position
    pub fn get(&self, owner: &Address) -> Option<&Position> {
        self.positions.get(owner)
    }

    /// Look up a position, failing if it was never created
    pub fn require(&self, owner: &Address) -> CdpResult<&Position> {
        self.positions
            .get(owner)
            .ok_or(CdpError::PositionNotFound { owner: *owner })
    }

    /// Look up a position that must accept owner-driven mutation
    pub fn require_active(&self, owner: &Address) -> CdpResult<&Position> {
        let position = self.require(owner)?;
        if !position.is_active() {
            return Err(CdpError::PositionNotActive { owner: *owner });
        }
        Ok(position)
    }

    /// Number of positions ever created
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if no position was ever created
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate over all positions
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Position)> {
        self.positions.iter()
    }

    /// Total collateral across all positions
    pub fn total_collateral(&self) -> u64 {
        self.total_collateral
    }

    /// Total debt across all positions
    pub fn total_debt(&self) -> u64 {
        self.total_debt
    }

    /// Current collateral ratio of a position in basis points
    ///
    /// `RATIO_INFINITE` when the position carries no debt.
    pub fn current_ratio(&self, owner: &Address, price: u64) -> CdpResult<u64> {
        let position = self.require(owner)?;
        collateral_ratio_bps(position.collateral, position.debt, price)
    }

    /// Snapshot of every active, indebted position other than `excluded` -
    /// the recipient set for shortfall redistribution
    pub fn debt_holders_except(&self, excluded: &Address) -> Vec<(Address, u64)> {
        self.positions
            .iter()
            .filter(|(owner, p)| *owner != excluded && p.is_active() && p.has_debt())
            .map(|(owner, p)| (*owner, p.debt))
            .collect()
    }

    // ============ Owner Operations ============

    /// Deposit collateral, creating the position on first use
    ///
    /// Returns the new collateral amount.
    pub fn deposit(&mut self, owner: Address, amount: u64, block_height: u64) -> CdpResult<u64> {
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        let new_total = safe_add(self.total_collateral, amount)?;

        let position = self
            .positions
            .entry(owner)
            .or_insert_with(|| Position::new(owner, block_height));
        if !position.is_active() {
            return Err(CdpError::PositionNotActive { owner });
        }
        let new_collateral = safe_add(position.collateral, amount)?;

        position.collateral = new_collateral;
        position.last_updated = block_height;
        self.total_collateral = new_total;
        Ok(new_collateral)
    }

    /// Withdraw collateral after verifying the resulting ratio
    ///
    /// Returns the new collateral amount and the resulting ratio.
    pub fn withdraw_collateral(
        &mut self,
        owner: Address,
        amount: u64,
        price: u64,
        min_ratio_bps: u64,
        block_height: u64,
    ) -> CdpResult<(u64, u64)> {
        let total_collateral = self.total_collateral;
        let position = self
            .positions
            .get_mut(&owner)
            .ok_or(CdpError::PositionNotFound { owner })?;
        if !position.is_active() {
            return Err(CdpError::PositionNotActive { owner });
        }
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        if amount > position.collateral {
            return Err(CdpError::InsufficientBalance {
                available: position.collateral,
                requested: amount,
            });
        }

        let new_collateral = position.collateral - amount;
        let new_ratio = collateral_ratio_bps(new_collateral, position.debt, price)?;
        if position.has_debt() && is_undercollateralized(new_ratio, min_ratio_bps) {
            return Err(CdpError::UndercollateralizedRequest {
                current_ratio: new_ratio,
                required_ratio: min_ratio_bps,
            });
        }

        position.collateral = new_collateral;
        position.last_updated = block_height;
        self.total_collateral = total_collateral - amount;
        Ok((new_collateral, new_ratio))
    }

    /// Raise a position's debt after verifying the resulting ratio
    ///
    /// Returns the new debt amount and the resulting ratio. The token
    /// mint that accompanies a successful raise is the engine's job.
    pub fn increase_debt(
        &mut self,
        owner: Address,
        amount: u64,
        price: u64,
        min_ratio_bps: u64,
        block_height: u64,
    ) -> CdpResult<(u64, u64)> {
        let new_total = safe_add(self.total_debt, amount)?;
        let position = self
            .positions
            .get_mut(&owner)
            .ok_or(CdpError::PositionNotFound { owner })?;
        if !position.is_active() {
            return Err(CdpError::PositionNotActive { owner });
        }
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }

        let new_debt = safe_add(position.debt, amount)?;
        let new_ratio = collateral_ratio_bps(position.collateral, new_debt, price)?;
        if is_undercollateralized(new_ratio, min_ratio_bps) {
            return Err(CdpError::UndercollateralizedRequest {
                current_ratio: new_ratio,
                required_ratio: min_ratio_bps,
            });
        }

        position.debt = new_debt;
        position.last_updated = block_height;
        self.total_debt = new_total;
        Ok((new_debt, new_ratio))
    }

    /// Lower a position's debt
    ///
    /// Returns the new debt amount. The accompanying token burn is the
    /// engine's job and happens before this is applied.
    pub fn decrease_debt(
        &mut self,
        owner: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<u64> {
        let total_debt = self.total_debt;
        let position = self
            .positions
            .get_mut(&owner)
            .ok_or(CdpError::PositionNotFound { owner })?;
        if !position.is_active() {
            return Err(CdpError::PositionNotActive { owner });
        }
        if amount == 0 {
            return Err(CdpError::InvalidAmount { amount });
        }
        if amount > position.debt {
            return Err(CdpError::ExcessRepayment {
                debt: position.debt,
                requested: amount,
            });
        }

        position.debt -= amount;
        position.last_updated = block_height;
        self.total_debt = total_debt - amount;
        Ok(position.debt)
    }

    // ============ Settlement-side Mutations ============
    //
    // Pre-validated by the engine; these assume the auction state machine
    // already authorized the transition.

    /// Flip a position's status
    pub(crate) fn set_status(&mut self, owner: &Address, status: PositionStatus) {
        if let Some(position) = self.positions.get_mut(owner) {
            position.status = status;
        }
    }

    /// Zero out a position at settlement, returning the (collateral,
    /// debt) that were seized. The position returns to Active with empty
    /// balances.
    pub(crate) fn seize(&mut self, owner: &Address, block_height: u64) -> (u64, u64) {
        match self.positions.get_mut(owner) {
            Some(position) => {
                let seized = (position.collateral, position.debt);
                position.collateral = 0;
                position.debt = 0;
                position.status = PositionStatus::Active;
                position.last_updated = block_height;
                self.total_collateral -= seized.0;
                self.total_debt -= seized.1;
                seized
            }
            None => (0, 0),
        }
    }

    /// Credit seized collateral to an account, creating its position on
    /// first use. Unlike `deposit` this bypasses the status check: a
    /// winner whose own position is under margin call still receives what
    /// they paid for.
    pub(crate) fn credit_collateral(
        &mut self,
        owner: Address,
        amount: u64,
        block_height: u64,
    ) -> CdpResult<u64> {
        let new_total = safe_add(self.total_collateral, amount)?;
        let position = self
            .positions
            .entry(owner)
            .or_insert_with(|| Position::new(owner, block_height));
        let new_collateral = safe_add(position.collateral, amount)?;

        position.collateral = new_collateral;
        position.last_updated = block_height;
        self.total_collateral = new_total;
        Ok(new_collateral)
    }

    /// Add a redistribution share to a position's debt
    pub(crate) fn apply_debt_delta(
        &mut self,
        owner: &Address,
        delta: u64,
        block_height: u64,
    ) -> CdpResult<()> {
        let new_total = safe_add(self.total_debt, delta)?;
        let position = self
            .positions
            .get_mut(owner)
            .ok_or(CdpError::PositionNotFound { owner: *owner })?;
        let new_debt = safe_add(position.debt, delta)?;

        position.debt = new_debt;
        position.last_updated = block_height;
        self.total_debt = new_total;
        Ok(())
    }
}
