//! Shared data model for the vearn client.
//!
//! All amounts are base units (wei-equivalent, 18 implied decimals).

use std::fmt;

use alloy::primitives::U256;
use serde::Deserialize;

use crate::serde_utils::deserialize_u256;
use crate::units::{format_units, TOKEN_DECIMALS};

/// VET and VTHO holdings of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub vet: U256,
    pub vtho: U256,
}

impl Balance {
    pub fn new(vet: U256, vtho: U256) -> Self {
        Self { vet, vtho }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} VET / {} VTHO",
            format_units(self.vet, TOKEN_DECIMALS),
            format_units(self.vtho, TOKEN_DECIMALS)
        )
    }
}

/// Per-account swap policy stored by the Trader contract.
///
/// When the VTHO balance exceeds `trigger_balance` the keeper may swap
/// everything above `reserve_balance` for VET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveConfig {
    pub trigger_balance: U256,
    pub reserve_balance: U256,
}

impl ReserveConfig {
    pub fn new(trigger_balance: U256, reserve_balance: U256) -> Self {
        Self {
            trigger_balance,
            reserve_balance,
        }
    }

    /// An account with no config has a zero trigger balance.
    pub fn is_registered(&self) -> bool {
        !self.trigger_balance.is_zero()
    }
}

/// A candidate swap strategy returned by the forecast service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(deserialize_with = "deserialize_u256")]
    pub protocol_fee: U256,
    #[serde(deserialize_with = "deserialize_u256")]
    pub dex_fee: U256,
    #[serde(deserialize_with = "deserialize_u256")]
    pub amount_in_with_fees: U256,
    #[serde(rename = "deltaVET", deserialize_with = "deserialize_u256")]
    pub delta_vet: U256,
    pub steps_count: u32,
    #[serde(deserialize_with = "deserialize_u256")]
    pub withdraw_amount: U256,
    #[serde(rename = "totalProfitVET", deserialize_with = "deserialize_u256")]
    pub total_profit_vet: U256,
}

/// Trades forecast for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    /// Network-wide estimate of the swap transaction fee (VTHO).
    #[serde(deserialize_with = "deserialize_u256")]
    pub tx_fee: U256,
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

impl Forecast {
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

/// VTHO/VET liquidity pool reserves, oriented for a VTHO -> VET swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    /// VTHO side (swap input).
    pub reserve_in: U256,
    /// VET side (swap output).
    pub reserve_out: U256,
}

/// Amounts for a single prospective swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeAmounts {
    pub withdraw_amount: U256,
    pub amount_out: U256,
    pub tx_fee: U256,
    pub protocol_fee: U256,
    pub dex_fee: U256,
    pub total_fees: U256,
}
