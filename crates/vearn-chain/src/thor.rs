//! Thor node REST client.
//!
//! Wraps the subset of the Thor API the client needs:
//! - `GET  /accounts/{address}` - VET balance and VTHO energy
//! - `POST /accounts/*` - read-only clause simulation
//! - `GET  /transactions/{id}/receipt` - receipts (null while pending)
//! - `GET  /blocks/{revision}` - block summaries
//! - `POST /transactions` - raw transaction submission

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vearn_common::serde_utils::{
    deserialize_b256, deserialize_bytes, deserialize_u256, deserialize_u64, encode_hex,
};

use crate::contracts::{Clause, ClauseBody};
use crate::error::GatewayError;

/// Default request timeout for node calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Account state returned by `/accounts/{address}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// VET balance (base units).
    #[serde(deserialize_with = "deserialize_u256")]
    pub balance: U256,
    /// VTHO balance (base units).
    #[serde(deserialize_with = "deserialize_u256")]
    pub energy: U256,
    pub has_code: bool,
}

/// One clause result from `/accounts/*`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    #[serde(deserialize_with = "deserialize_bytes")]
    pub data: Bytes,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
    #[serde(default)]
    pub transfers: Vec<serde_json::Value>,
    pub gas_used: u64,
    pub reverted: bool,
    #[serde(default)]
    pub vm_error: String,
}

/// Receipt metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptMeta {
    #[serde(rename = "blockID", deserialize_with = "deserialize_b256")]
    pub block_id: B256,
    pub block_number: u64,
    pub block_timestamp: u64,
    #[serde(rename = "txID", deserialize_with = "deserialize_b256")]
    pub tx_id: B256,
    pub tx_origin: String,
}

/// Transaction receipt from `/transactions/{id}/receipt`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub gas_used: u64,
    pub gas_payer: String,
    #[serde(deserialize_with = "deserialize_u256")]
    pub paid: U256,
    #[serde(deserialize_with = "deserialize_u256")]
    pub reward: U256,
    pub reverted: bool,
    pub meta: ReceiptMeta,
    #[serde(default)]
    pub outputs: Vec<serde_json::Value>,
}

/// Block summary from `/blocks/{revision}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub number: u64,
    #[serde(deserialize_with = "deserialize_b256")]
    pub id: B256,
    #[serde(deserialize_with = "deserialize_u64")]
    pub timestamp: u64,
}

impl BlockSummary {
    /// First 8 bytes of the block id, used as a transaction's `blockRef`.
    pub fn block_ref(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.id[..8]);
        u64::from_be_bytes(bytes)
    }
}

/// Which block to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRevision {
    Best,
    Number(u64),
}

impl BlockRevision {
    fn as_path(&self) -> String {
        match self {
            BlockRevision::Best => "best".to_string(),
            BlockRevision::Number(n) => n.to_string(),
        }
    }
}

/// Read and submit access to a Thor node.
///
/// Implementations:
/// - `ThorClient`: HTTP against a real node
/// - `MemoryNode`: in-memory chain for offline runs and tests
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch VET/VTHO balances of an account.
    async fn account(&self, address: Address) -> Result<AccountInfo, GatewayError>;

    /// Simulate clauses without submitting them.
    async fn call(
        &self,
        clauses: &[Clause],
        caller: Option<Address>,
    ) -> Result<Vec<CallOutput>, GatewayError>;

    /// Fetch a receipt. `None` while the transaction is not in a block.
    async fn receipt(&self, tx_id: B256) -> Result<Option<Receipt>, GatewayError>;

    /// Fetch a block summary.
    async fn block(&self, revision: BlockRevision) -> Result<BlockSummary, GatewayError>;

    /// Submit a signed, RLP-encoded transaction. Returns its id.
    async fn send_raw(&self, raw: &[u8]) -> Result<B256, GatewayError>;
}

#[derive(Serialize)]
struct CallRequest {
    clauses: Vec<ClauseBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caller: Option<String>,
}

#[derive(Serialize)]
struct RawTxRequest {
    raw: String,
}

#[derive(Deserialize)]
struct TxIdResponse {
    #[serde(deserialize_with = "deserialize_b256")]
    id: B256,
}

/// HTTP client for a Thor node.
pub struct ThorClient {
    http: Client,
    base_url: String,
}

impl ThorClient {
    /// Create a client for the node at `base_url`.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");

        let response = self.http.get(&url).send().await?;
        Self::parse_response(response, &url).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");

        let response = self.http.post(&url).json(body).send().await?;
        Self::parse_response(response, &url).await
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), body = %body, "Thor API error");
            return Err(GatewayError::Network(format!(
                "status {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl NodeClient for ThorClient {
    async fn account(&self, address: Address) -> Result<AccountInfo, GatewayError> {
        self.get_json(&format!("/accounts/{}", encode_hex(address.as_slice())))
            .await
    }

    async fn call(
        &self,
        clauses: &[Clause],
        caller: Option<Address>,
    ) -> Result<Vec<CallOutput>, GatewayError> {
        let request = CallRequest {
            clauses: clauses.iter().map(Clause::to_body).collect(),
            caller: caller.map(|c| encode_hex(c.as_slice())),
        };
        self.post_json("/accounts/*", &request).await
    }

    async fn receipt(&self, tx_id: B256) -> Result<Option<Receipt>, GatewayError> {
        self.get_json(&format!("/transactions/{}/receipt", encode_hex(tx_id)))
            .await
    }

    async fn block(&self, revision: BlockRevision) -> Result<BlockSummary, GatewayError> {
        let block: Option<BlockSummary> = self
            .get_json(&format!("/blocks/{}", revision.as_path()))
            .await?;
        block.ok_or_else(|| GatewayError::Network(format!("block {:?} not found", revision)))
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<B256, GatewayError> {
        let response: TxIdResponse = self
            .post_json("/transactions", &RawTxRequest { raw: encode_hex(raw) })
            .await?;
        Ok(response.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_info_deserialize() {
        let json = r#"{
            "balance": "0x3635c9adc5dea00000",
            "energy": "0x2b5e3af16b1880000",
            "hasCode": false
        }"#;
        let info: AccountInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.balance, U256::from(1_000_000_000_000_000_000_000u128));
        assert_eq!(info.energy, U256::from(50_000_000_000_000_000_000u128));
        assert!(!info.has_code);
    }

    #[test]
    fn test_call_output_deserialize() {
        let json = r#"[{
            "data": "0x000000000000000000000000000000000000000000000000000000000000002a",
            "events": [],
            "transfers": [],
            "gasUsed": 1234,
            "reverted": false,
            "vmError": ""
        }]"#;
        let outputs: Vec<CallOutput> = serde_json::from_str(json).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].data.len(), 32);
        assert_eq!(outputs[0].data[31], 42);
        assert_eq!(outputs[0].gas_used, 1234);
    }

    #[test]
    fn test_receipt_deserialize() {
        let json = r#"{
            "gasUsed": 21000,
            "gasPayer": "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed",
            "paid": "0x1236efcbcbb340000",
            "reward": "0x576e189f04f60000",
            "reverted": true,
            "meta": {
                "blockID": "0x0004f6cc88bb4626a92907718e82f255b8fa511453a78e8797eb8cea3393b215",
                "blockNumber": 325324,
                "blockTimestamp": 1533267900,
                "txID": "0x284bba50ef777889ff1a367ed0b38d5e5626714477c40de38d71cedd6f9fa477",
                "txOrigin": "0x7567d83b7b8d80addcb281a71d54fc7b3364ffed"
            },
            "outputs": []
        }"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert!(receipt.reverted);
        assert_eq!(receipt.meta.block_number, 325324);
        assert_eq!(receipt.gas_used, 21000);
    }

    #[test]
    fn test_pending_receipt_is_null() {
        let receipt: Option<Receipt> = serde_json::from_str("null").unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn test_block_ref() {
        let json = r#"{
            "number": 325324,
            "id": "0x0004f6cc88bb4626a92907718e82f255b8fa511453a78e8797eb8cea3393b215",
            "timestamp": 1533267900
        }"#;
        let block: BlockSummary = serde_json::from_str(json).unwrap();
        assert_eq!(block.block_ref(), 0x0004f6cc88bb4626);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ThorClient::new("https://testnet.vechain.org/", None).unwrap();
        assert_eq!(client.base_url(), "https://testnet.vechain.org");
    }
}
