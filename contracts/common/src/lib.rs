//! CDP Core Common Library
//!
//! Shared types, constants, and utilities for the socialised-loss CDP
//! engine. This crate is the foundation the component crates build on:
//!
//! - **Typed errors**: every failure mode the engine can surface, with
//!   context and stable codes for indexing.
//! - **Constants**: token metadata, ratio thresholds, auction timing.
//! - **Core types**: positions, auctions, oracle price data, engine
//!   configuration.
//! - **Checked math**: overflow-safe fixed-point helpers and the
//!   collateral-ratio calculation every solvency check runs through.
//! - **Events**: the protocol event log consumed by off-core indexers.
//!
//! This crate is `no_std` compatible when built without the default
//! `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export Vec for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod types;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use events::*;
pub use math::*;
pub use types::*;
