//! Mathematical Utilities for the CDP Engine
//!
//! Safe math operations and the collateral-ratio calculations every
//! solvency check runs through.

use crate::constants::{oracle, precision, ratios};
use crate::errors::{CdpError, CdpResult};

/// Calculate the collateral value of a position in debt-token base units
///
/// value = collateral * price / PRICE_ONE
///
/// # Arguments
/// * `collateral` - Collateral in base units (8 decimals)
/// * `price` - Debt-token value of one whole collateral unit (8 decimals)
pub fn collateral_value(collateral: u64, price: u64) -> CdpResult<u64> {
    let value = (collateral as u128)
        .checked_mul(price as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(oracle::PRICE_ONE as u128)
        .ok_or(CdpError::DivisionByZero)?;

    Ok(value.min(u64::MAX as u128) as u64)
}

/// Calculate a position's collateral ratio in basis points
///
/// ratio_bps = collateral_value * 10_000 / debt
///
/// Returns `ratios::RATIO_INFINITE` for zero debt.
pub fn collateral_ratio_bps(collateral: u64, debt: u64, price: u64) -> CdpResult<u64> {
    if debt == 0 {
        return Ok(ratios::RATIO_INFINITE);
    }

    let value = (collateral as u128)
        .checked_mul(price as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(oracle::PRICE_ONE as u128)
        .ok_or(CdpError::DivisionByZero)?;

    let ratio = value
        .checked_mul(precision::BPS_DENOMINATOR as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(debt as u128)
        .ok_or(CdpError::DivisionByZero)?;

    // Cap at the sentinel if the ratio somehow exceeds u64
    Ok(ratio.min(u64::MAX as u128) as u64)
}

/// Check whether a ratio is below the required minimum
pub fn is_undercollateralized(ratio_bps: u64, min_ratio_bps: u64) -> bool {
    ratio_bps < min_ratio_bps
}

/// Calculate the maximum debt a collateral amount can carry at the given
/// minimum ratio
///
/// max_debt = collateral_value * 10_000 / min_ratio_bps
pub fn max_debt_for_collateral(collateral: u64, price: u64, min_ratio_bps: u64) -> CdpResult<u64> {
    if min_ratio_bps == 0 {
        return Err(CdpError::DivisionByZero);
    }

    let value = collateral_value(collateral, price)?;
    let max_debt = (value as u128)
        .checked_mul(precision::BPS_DENOMINATOR as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(min_ratio_bps as u128)
        .ok_or(CdpError::DivisionByZero)?;

    Ok(max_debt.min(u64::MAX as u128) as u64)
}

/// Calculate the minimum collateral needed to carry a debt at the given
/// minimum ratio
///
/// min_collateral = debt * min_ratio_bps / 10_000 * PRICE_ONE / price
pub fn min_collateral_for_debt(debt: u64, price: u64, min_ratio_bps: u64) -> CdpResult<u64> {
    if price == 0 {
        return Err(CdpError::DivisionByZero);
    }

    let required_value = (debt as u128)
        .checked_mul(min_ratio_bps as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(precision::BPS_DENOMINATOR as u128)
        .ok_or(CdpError::DivisionByZero)?;

    let min_collateral = required_value
        .checked_mul(oracle::PRICE_ONE as u128)
        .ok_or(CdpError::Overflow)?
        .checked_div(price as u128)
        .ok_or(CdpError::DivisionByZero)?;

    Ok(min_collateral.min(u64::MAX as u128) as u64)
}

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> CdpResult<u64> {
    a.checked_add(b).ok_or(CdpError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> CdpResult<u64> {
    a.checked_sub(b).ok_or(CdpError::Underflow)
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u64, b: u64) -> CdpResult<u128> {
    (a as u128).checked_mul(b as u128).ok_or(CdpError::Overflow)
}

/// Safe division with zero check
pub fn safe_div(a: u128, b: u64) -> CdpResult<u64> {
    if b == 0 {
        return Err(CdpError::DivisionByZero);
    }
    Ok((a / b as u128).min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u64 = 100_000_000;
    const PRICE_200: u64 = 200 * ONE;
    const PRICE_100: u64 = 100 * ONE;

    #[test]
    fn test_collateral_value() {
        // 2 collateral units at price 200 = 400 debt units of value
        let value = collateral_value(2 * ONE, PRICE_200).unwrap();
        assert_eq!(value, 400 * ONE);
    }

    #[test]
    fn test_ratio_calculation() {
        // 2 collateral at 200 backing 360 debt: 400/360 = 111.11%
        let ratio = collateral_ratio_bps(2 * ONE, 360 * ONE, PRICE_200).unwrap();
        assert_eq!(ratio, 11_111);

        // Same position after the price halves: 200/360 = 55.55%
        let ratio = collateral_ratio_bps(2 * ONE, 360 * ONE, PRICE_100).unwrap();
        assert_eq!(ratio, 5_555);

        // 1:1 value to debt = exactly 100%
        let ratio = collateral_ratio_bps(ONE, 200 * ONE, PRICE_200).unwrap();
        assert_eq!(ratio, 10_000);
    }

    #[test]
    fn test_ratio_zero_debt() {
        let ratio = collateral_ratio_bps(ONE, 0, PRICE_200).unwrap();
        assert_eq!(ratio, crate::constants::ratios::RATIO_INFINITE);
    }

    #[test]
    fn test_undercollateralized_threshold() {
        assert!(is_undercollateralized(11_110, 11_111));
        assert!(!is_undercollateralized(11_111, 11_111));
        assert!(!is_undercollateralized(20_000, 15_000));
    }

    #[test]
    fn test_max_debt_for_collateral() {
        // 2 collateral at 200 with 150% minimum: 400 / 1.5 = 266.66
        let max_debt = max_debt_for_collateral(2 * ONE, PRICE_200, 15_000).unwrap();
        assert_eq!(max_debt, 266_66666666);
    }

    #[test]
    fn test_min_collateral_for_debt() {
        // 300 debt at price 200 with 150% minimum needs 2.25 collateral
        let min_coll = min_collateral_for_debt(300 * ONE, PRICE_200, 15_000).unwrap();
        assert_eq!(min_coll, 2 * ONE + ONE / 4);
    }

    #[test]
    fn test_safe_math() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert_eq!(safe_add(u64::MAX, 1), Err(CdpError::Overflow));
        assert_eq!(safe_sub(2, 3), Err(CdpError::Underflow));
        assert_eq!(safe_div(10, 0), Err(CdpError::DivisionByZero));
        assert_eq!(safe_mul(u64::MAX, 2).unwrap(), (u64::MAX as u128) * 2);
    }
}
