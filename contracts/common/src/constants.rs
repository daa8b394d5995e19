//! Protocol Constants
//!
//! All magic numbers and default configuration values for the CDP engine.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (longer auction windows)
//! - Default (no feature) - Test values (short windows for fast iteration)
//!
//! ```toml
//! # For mainnet deployment:
//! cdp-common = { path = "...", features = ["mainnet"] }
//! ```

/// Token Metadata
pub mod token {
    /// Token name
    pub const NAME: &str = "USD Token";
    /// Token symbol
    pub const SYMBOL: &str = "USD";
    /// Decimal places
    pub const DECIMALS: u8 = 8;
    /// One unit with decimals (1 USD = 100_000_000 base units)
    pub const ONE: u64 = 100_000_000;

    /// Maximum supply (10 billion USD - fits in u64)
    /// 10_000_000_000 * 100_000_000 = 10^18 < u64::MAX
    pub const MAX_SUPPLY: u64 = 10_000_000_000 * ONE;
}

/// Collateral asset configuration
pub mod collateral {
    /// Decimal places (same precision as the debt token)
    pub const DECIMALS: u8 = 8;
    /// One collateral unit in base units
    pub const ONE: u64 = 100_000_000;
}

/// Collateralization Ratios (in basis points, 10_000 = 100%)
pub mod ratios {
    /// Default minimum collateral ratio - below this a position can be
    /// margin-called (150%)
    pub const MIN_COLLATERAL_RATIO_BPS: u64 = 15_000;

    /// Recommended minimum ratio for users (safety buffer, 200%)
    pub const RECOMMENDED_MIN_BPS: u64 = 20_000;

    /// Sentinel ratio for positions with zero debt
    pub const RATIO_INFINITE: u64 = u64::MAX;
}

/// Margin-call auction configuration
pub mod auction {
    /// Bidding window length in blocks. An auction with no bid when the
    /// window closes expires; with bids it becomes settleable.
    /// - Mainnet: 144 blocks (~1 day at 10 min blocks)
    /// - Testnet: 12 blocks (fast expiry for testing)
    #[cfg(feature = "mainnet")]
    pub const BID_WINDOW_BLOCKS: u64 = 144;
    #[cfg(not(feature = "mainnet"))]
    pub const BID_WINDOW_BLOCKS: u64 = 12;
}

/// Oracle Configuration
pub mod oracle {
    /// Price precision (8 decimals)
    pub const PRICE_DECIMALS: u8 = 8;

    /// One price unit: the stored price is debt-token value per whole
    /// collateral unit, scaled by this factor
    pub const PRICE_ONE: u64 = 100_000_000;
}

/// Precision constants
pub mod precision {
    /// Basis points denominator (10_000 = 100%)
    pub const BPS_DENOMINATOR: u64 = 10_000;
}
