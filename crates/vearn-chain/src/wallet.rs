//! Wallet bridges.
//!
//! A `WalletBridge` signs identification certificates and transactions for
//! one account. Two providers exist:
//!
//! ## Local
//!
//! A private key held in process. Transactions are built, signed and
//! submitted directly against the node.
//!
//! ## Relay
//!
//! A remote signing relay in the Sync2/VeWorld style. The request is posted
//! to `<relay>/<id>`, the user approves it in their wallet, and the result is
//! polled from `<relay>/<id>-resp` until the signing timeout elapses.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use vearn_common::serde_utils::{deserialize_b256, encode_hex};

use crate::certificate::{signature_bytes, Certificate, CertificateMessage};
use crate::contracts::{Clause, ClauseBody};
use crate::error::GatewayError;
use crate::thor::{BlockRevision, NodeClient};
use crate::tx::{intrinsic_gas, Transaction, DEFAULT_EXPIRATION, EXECUTION_GAS_BUFFER};

/// Default interval between relay response polls.
const RELAY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Which wallet provider backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Local,
    Relay,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Local => write!(f, "local"),
            ProviderId::Relay => write!(f, "relay"),
        }
    }
}

impl FromStr for ProviderId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ProviderId::Local),
            "relay" => Ok(ProviderId::Relay),
            other => Err(GatewayError::ExtensionNotDetected(other.to_string())),
        }
    }
}

/// A transaction signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub clauses: Vec<Clause>,
    /// Account that must sign. `None` lets the wallet pick.
    pub signer: Option<Address>,
    pub comment: String,
}

/// Result of a signed and submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxResponse {
    pub tx_id: B256,
    pub signer: Address,
}

#[async_trait]
pub trait WalletBridge: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Ask the user to sign `message`. The returned certificate is unverified.
    async fn sign_certificate(&self, message: &CertificateMessage) -> Result<Certificate, GatewayError>;

    /// Ask the user to sign and submit a transaction.
    async fn sign_transaction(&self, request: &TxRequest) -> Result<TxResponse, GatewayError>;
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// ============================================================================
// Local
// ============================================================================

pub struct LocalWallet {
    signer: PrivateKeySigner,
    node: Arc<dyn NodeClient>,
    domain: String,
    chain_tag: OnceCell<u8>,
}

impl LocalWallet {
    pub fn new(signer: PrivateKeySigner, node: Arc<dyn NodeClient>, domain: impl Into<String>) -> Self {
        Self {
            signer,
            node,
            domain: domain.into(),
            chain_tag: OnceCell::new(),
        }
    }

    /// Wallet for a hex private key (with or without `0x`).
    pub fn from_private_key(
        key: &str,
        node: Arc<dyn NodeClient>,
        domain: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let signer = PrivateKeySigner::from_str(key.trim()).map_err(|_| {
            GatewayError::ExtensionNotDetected("local: invalid private key".to_string())
        })?;
        Ok(Self::new(signer, node, domain))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Last byte of the genesis block id.
    async fn chain_tag(&self) -> Result<u8, GatewayError> {
        self.chain_tag
            .get_or_try_init(|| async {
                let genesis = self.node.block(BlockRevision::Number(0)).await?;
                Ok::<u8, GatewayError>(genesis.id[31])
            })
            .await
            .copied()
    }

    /// Simulated execution gas plus intrinsic gas and buffer.
    async fn estimate_gas(&self, clauses: &[Clause]) -> Result<u64, GatewayError> {
        let outputs = self.node.call(clauses, Some(self.address())).await?;
        if let Some(failed) = outputs.iter().find(|o| o.reverted) {
            return Err(GatewayError::Network(format!(
                "simulation reverted: {}",
                failed.vm_error
            )));
        }

        let execution: u64 = outputs.iter().map(|o| o.gas_used).sum();
        let buffer = if execution > 0 { EXECUTION_GAS_BUFFER } else { 0 };
        Ok(intrinsic_gas(clauses) + execution + buffer)
    }

    pub async fn build_transaction(&self, clauses: Vec<Clause>) -> Result<Transaction, GatewayError> {
        let chain_tag = self.chain_tag().await?;
        let gas = self.estimate_gas(&clauses).await?;
        let best = self.node.block(BlockRevision::Best).await?;

        Ok(Transaction {
            chain_tag,
            block_ref: best.block_ref(),
            expiration: DEFAULT_EXPIRATION,
            clauses,
            gas_price_coef: 0,
            gas,
            depends_on: None,
            nonce: rand::random(),
        })
    }
}

#[async_trait]
impl WalletBridge for LocalWallet {
    fn provider(&self) -> ProviderId {
        ProviderId::Local
    }

    async fn sign_certificate(&self, message: &CertificateMessage) -> Result<Certificate, GatewayError> {
        let cert = Certificate::new(message, &self.domain, unix_now(), self.address());
        let signature = self
            .signer
            .sign_hash_sync(&cert.signing_hash())
            .map_err(|e| GatewayError::InvalidCertificate(e.to_string()))?;
        Ok(cert.with_signature(&signature))
    }

    async fn sign_transaction(&self, request: &TxRequest) -> Result<TxResponse, GatewayError> {
        let address = self.address();
        if let Some(expected) = request.signer {
            if expected != address {
                warn!(expected = %expected, actual = %address, "Signer mismatch");
                return Err(GatewayError::UserRejected);
            }
        }

        let tx = self.build_transaction(request.clauses.clone()).await?;
        let signature = self
            .signer
            .sign_hash_sync(&tx.signing_hash())
            .map_err(|e| GatewayError::Network(format!("signing failed: {e}")))?;
        let raw = tx.encode_signed(&signature_bytes(&signature));

        let tx_id = self.node.send_raw(&raw).await?;
        info!(
            tx_id = %tx_id,
            signer = %address,
            clauses = tx.clauses.len(),
            gas = tx.gas,
            comment = %request.comment,
            "Transaction submitted"
        );

        Ok(TxResponse {
            tx_id,
            signer: address,
        })
    }
}

// ============================================================================
// Relay
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    signer: Option<String>,
    comment: &'a str,
    domain: &'a str,
}

#[derive(Serialize)]
struct RelayRequest<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: P,
    options: RelayOptions<'a>,
    nonce: String,
}

#[derive(Deserialize)]
struct RelayResponse<T> {
    payload: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CertAnnex {
    domain: String,
    timestamp: u64,
    signer: String,
}

#[derive(Deserialize)]
struct CertResponse {
    annex: CertAnnex,
    signature: String,
}

#[derive(Deserialize)]
struct TxResponseBody {
    #[serde(deserialize_with = "deserialize_b256")]
    txid: B256,
    signer: String,
}

pub struct RelayWallet {
    http: Client,
    relay_url: String,
    domain: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl RelayWallet {
    pub fn new(relay_url: &str, domain: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let relay_url = relay_url.trim().trim_end_matches('/');
        if relay_url.is_empty() {
            return Err(GatewayError::ExtensionNotDetected(
                "relay: no relay URL configured".to_string(),
            ));
        }

        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(15)).build()?,
            relay_url: relay_url.to_string(),
            domain: domain.into(),
            timeout,
            poll_interval: RELAY_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Post a request and wait for the wallet's answer.
    async fn round_trip<P: Serialize + Send + Sync, T: DeserializeOwned + Send>(
        &self,
        kind: &'static str,
        payload: P,
        signer: Option<Address>,
        comment: &str,
    ) -> Result<T, GatewayError> {
        let request_id = hex::encode(rand::random::<[u8; 16]>());
        let request = RelayRequest {
            kind,
            payload,
            options: RelayOptions {
                signer: signer.map(|s| encode_hex(s.as_slice())),
                comment,
                domain: &self.domain,
            },
            nonce: hex::encode(rand::random::<[u8; 8]>()),
        };

        let request_url = format!("{}/{}", self.relay_url, request_id);
        let response = self.http.post(&request_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::ExtensionNotDetected(format!(
                "relay returned {}",
                response.status().as_u16()
            )));
        }
        info!(url = %request_url, kind, "Waiting for wallet approval");

        let poll = self.poll_response::<T>(&request_id);
        match tokio::time::timeout(self.timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %request_id, timeout_secs = self.timeout.as_secs(), "Signing request timed out");
                Err(GatewayError::UserRejected)
            }
        }
    }

    async fn poll_response<T: DeserializeOwned + Send>(&self, request_id: &str) -> Result<T, GatewayError> {
        let url = format!("{}/{}-resp", self.relay_url, request_id);
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = match self.http.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(error = %e, "Relay poll failed");
                    continue;
                }
            };
            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            if !response.status().is_success() {
                return Err(GatewayError::Network(format!(
                    "relay returned {}",
                    response.status().as_u16()
                )));
            }

            let body = response.text().await?;
            if body.trim().is_empty() {
                continue;
            }
            let parsed: RelayResponse<T> = serde_json::from_str(&body)
                .map_err(|e| GatewayError::Decode(format!("relay response: {e}")))?;

            if let Some(error) = parsed.error {
                info!(error = %error, "Wallet declined the request");
                return Err(GatewayError::UserRejected);
            }
            if let Some(payload) = parsed.payload {
                return Ok(payload);
            }
        }
    }
}

#[async_trait]
impl WalletBridge for RelayWallet {
    fn provider(&self) -> ProviderId {
        ProviderId::Relay
    }

    async fn sign_certificate(&self, message: &CertificateMessage) -> Result<Certificate, GatewayError> {
        let response: CertResponse = self.round_trip("cert", message, None, "").await?;
        Ok(Certificate {
            purpose: message.purpose.clone(),
            payload: message.payload.clone(),
            domain: response.annex.domain,
            timestamp: response.annex.timestamp,
            signer: response.annex.signer,
            signature: Some(response.signature),
        })
    }

    async fn sign_transaction(&self, request: &TxRequest) -> Result<TxResponse, GatewayError> {
        let clauses: Vec<ClauseBody> = request.clauses.iter().map(Clause::to_body).collect();
        let response: TxResponseBody = self
            .round_trip("tx", clauses, request.signer, &request.comment)
            .await?;

        let signer = Address::from_str(&response.signer)
            .map_err(|e| GatewayError::Decode(format!("relay signer: {e}")))?;
        Ok(TxResponse {
            tx_id: response.txid,
            signer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{build_clause, IEnergy, ENERGY_ADDRESS};
    use crate::memory::MemoryNode;
    use alloy::primitives::U256;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_provider_id_parse_and_display() {
        assert_eq!("local".parse::<ProviderId>().unwrap(), ProviderId::Local);
        assert_eq!(" Relay ".parse::<ProviderId>().unwrap(), ProviderId::Relay);
        assert!(matches!(
            "sync1".parse::<ProviderId>(),
            Err(GatewayError::ExtensionNotDetected(_))
        ));
        assert_eq!(ProviderId::Relay.to_string(), "relay");
        assert_eq!(serde_json::to_string(&ProviderId::Local).unwrap(), "\"local\"");
    }

    #[test]
    fn test_invalid_private_key() {
        let node = Arc::new(MemoryNode::new());
        let result = LocalWallet::from_private_key("not-a-key", node, "vearn.test");
        assert!(matches!(result, Err(GatewayError::ExtensionNotDetected(_))));
    }

    #[test]
    fn test_relay_requires_url() {
        let result = RelayWallet::new("  ", "vearn.test", Duration::from_secs(1));
        assert!(matches!(result, Err(GatewayError::ExtensionNotDetected(_))));
    }

    #[tokio::test]
    async fn test_local_certificate_verifies() {
        let node = Arc::new(MemoryNode::new());
        let wallet = LocalWallet::from_private_key(KEY, node, "vearn.test").unwrap();

        let cert = wallet
            .sign_certificate(&CertificateMessage::identification())
            .await
            .unwrap();
        assert_eq!(cert.domain, "vearn.test");
        assert_eq!(cert.verify().unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn test_local_transaction_uses_chain_state() {
        let node = Arc::new(MemoryNode::with_chain_tag(0x4a));
        let wallet = LocalWallet::from_private_key(KEY, node.clone(), "vearn.test").unwrap();
        let clause = build_clause(
            ENERGY_ADDRESS,
            &IEnergy::approveCall {
                spender: ENERGY_ADDRESS,
                value: U256::MAX,
            },
        );

        let tx = wallet.build_transaction(vec![clause.clone()]).await.unwrap();
        assert_eq!(tx.chain_tag, 0x4a);
        assert_eq!(tx.expiration, DEFAULT_EXPIRATION);
        assert!(tx.gas > intrinsic_gas(&[clause.clone()]) + EXECUTION_GAS_BUFFER);

        let response = wallet
            .sign_transaction(&TxRequest {
                clauses: vec![clause],
                signer: Some(wallet.address()),
                comment: "approve".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.signer, wallet.address());
        assert_eq!(node.sent_transactions().len(), 1);

        node.advance(1);
        assert!(node.receipt(response.tx_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_refuses_other_signer() {
        let node = Arc::new(MemoryNode::new());
        let wallet = LocalWallet::from_private_key(KEY, node.clone(), "vearn.test").unwrap();

        let result = wallet
            .sign_transaction(&TxRequest {
                clauses: vec![],
                signer: Some(Address::ZERO),
                comment: String::new(),
            })
            .await;
        assert!(matches!(result, Err(GatewayError::UserRejected)));
        assert!(node.sent_transactions().is_empty());
    }
}
