//! Contract ABIs and clause construction.
//!
//! Every contract method the client touches has a typed `sol!` binding, so
//! call data is encoded and return data validated against its schema.

use alloy::primitives::{address, Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::Serialize;

use vearn_common::serde_utils::encode_hex;

use crate::error::GatewayError;

/// VTHO (energy) built-in contract.
pub const ENERGY_ADDRESS: Address = address!("0000000000000000000000000000456e65726779");

sol! {
    interface IEnergy {
        function approve(address spender, uint256 value) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[derive(Debug)]
    interface ITrader {
        function addressToConfig(address account) external view returns (uint256 triggerBalance, uint256 reserveBalance);
        function saveConfig(uint256 triggerBalance, uint256 reserveBalance) external;
    }

    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

/// Addresses of the contracts the client interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contracts {
    /// VTHO token.
    pub energy: Address,
    /// Trader contract holding per-account swap configs.
    pub trader: Address,
    /// VTHO/VET DEX pair used to price extended solutions.
    pub pair: Option<Address>,
}

/// An unsigned contract call: target, VET value and call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl Clause {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to: Some(to),
            value,
            data,
        }
    }

    /// JSON shape expected by the Thor `/accounts/*` endpoint.
    pub fn to_body(&self) -> ClauseBody {
        ClauseBody {
            to: self.to.map(|to| encode_hex(to.as_slice())),
            value: format!("0x{:x}", self.value),
            data: encode_hex(&self.data),
        }
    }
}

/// Wire representation of a clause.
#[derive(Debug, Clone, Serialize)]
pub struct ClauseBody {
    pub to: Option<String>,
    pub value: String,
    pub data: String,
}

/// Build a zero-value clause calling `call` on `to`. No I/O.
pub fn build_clause<C: SolCall>(to: Address, call: &C) -> Clause {
    Clause::new(to, U256::ZERO, Bytes::from(call.abi_encode()))
}

/// Decode return data for `C`, failing on shape mismatch.
pub fn decode_return<C: SolCall>(data: &[u8]) -> Result<C::Return, GatewayError> {
    C::abi_decode_returns(data)
        .map_err(|e| GatewayError::Decode(format!("{}: {}", C::SIGNATURE, e)))
}

/// Join per-clause comments into one transaction comment.
pub fn join_comments(comments: &[&str]) -> String {
    comments
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub const APPROVE_COMMENT: &str = "Allow the Trader contract to spend your VTHO.";
pub const REVOKE_COMMENT: &str = "Revoke the Trader contract's VTHO allowance.";
pub const SAVE_CONFIG_COMMENT: &str = "Save your reserve balance configuration.";
