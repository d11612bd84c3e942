//! Serde helpers for quantities encoded as strings on the wire.
//!
//! The Thor node encodes quantities as `0x`-prefixed hex strings while the
//! forecast service uses decimal strings. Both decode into `U256`.

use std::str::FromStr;

use alloy::primitives::{Bytes, B256, U256};
use serde::{de, Deserialize, Deserializer};

/// Parse a `U256` from a `0x` hex string or a decimal string.
pub fn parse_u256(value: &str) -> Result<U256, String> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some("") => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("{value}: {e}")),
        None => U256::from_str_radix(value, 10).map_err(|e| format!("{value}: {e}")),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Str(String),
    Num(u64),
}

/// Deserialize a `U256` from a hex string, decimal string or JSON integer.
pub fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match RawQuantity::deserialize(deserializer)? {
        RawQuantity::Str(s) => parse_u256(&s).map_err(de::Error::custom),
        RawQuantity::Num(n) => Ok(U256::from(n)),
    }
}

/// Deserialize a `u64` from a JSON integer or a hex/decimal string.
pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawQuantity::deserialize(deserializer)? {
        RawQuantity::Num(n) => Ok(n),
        RawQuantity::Str(s) => {
            let value = parse_u256(&s).map_err(de::Error::custom)?;
            u64::try_from(value).map_err(|_| de::Error::custom(format!("{s} exceeds u64")))
        }
    }
}

/// Deserialize `0x`-prefixed hex into `Bytes`.
pub fn deserialize_bytes<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    decode_hex(&s).map(Bytes::from).map_err(de::Error::custom)
}

/// Deserialize a 32-byte hash.
pub fn deserialize_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    B256::from_str(&s).map_err(de::Error::custom)
}

/// Decode a hex string with or without the `0x` prefix.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, String> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(hex_str).map_err(|e| format!("invalid hex {value:?}: {e}"))
}

/// Encode bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}
