//! Shared types and pure logic for the vearn client.
//!
//! This crate contains:
//! - Fixed-point unit conversion (`units`)
//! - The data model shared by the chain gateway and the stores (`types`)
//! - The trade math engine (`math`)
//! - Serde helpers for hex/decimal encoded quantities (`serde_utils`)
//!
//! CRITICAL: token amounts are `U256` base units (18 implied decimals).
//! NEVER use f64 for token math.

pub mod math;
pub mod serde_utils;
pub mod types;
pub mod units;

pub use math::{
    choose_solution, compute_trade_amounts, exchange_rate, extend_solution,
    seconds_until_trigger, TradeParams, MAX_WITHDRAW_AMOUNT,
};
pub use types::*;
pub use units::{format_units, parse_units, truncate, UnitsError, TOKEN_DECIMALS};
