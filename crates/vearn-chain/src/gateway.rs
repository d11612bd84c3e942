//! Chain gateway.
//!
//! The only component that talks to wallets and the node. It owns the active
//! wallet bridge and the persisted session record, and serialises signing
//! requests: one request (certificate or transaction) may wait on the wallet
//! at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vearn_common::{Balance, PoolReserves};

use crate::certificate::{Certificate, CertificateMessage, IDENTIFICATION_PURPOSE};
use crate::contracts::{self, decode_return, Clause, IUniswapV2Pair};
use crate::error::GatewayError;
use crate::storage::{PersistedSession, SessionStorage};
use crate::thor::{BlockRevision, NodeClient, Receipt};
use crate::ticker::BlockTicker;
use crate::wallet::{ProviderId, TxRequest, WalletBridge};

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Domain certificates must be issued for.
    pub domain: String,
    pub block_poll_interval: Duration,
    /// Blocks to wait for a receipt before giving up.
    pub max_blocks_to_wait: u32,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            domain: "vearn".to_string(),
            block_poll_interval: Duration::from_secs(2),
            max_blocks_to_wait: 5,
        }
    }
}

/// A verified wallet session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub provider: ProviderId,
    pub account: Address,
    pub certificate: Certificate,
}

/// Resets the signing flag when dropped.
struct SigningGuard<'a>(&'a AtomicBool);

impl Drop for SigningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChainGateway {
    node: Arc<dyn NodeClient>,
    wallets: HashMap<ProviderId, Arc<dyn WalletBridge>>,
    active: RwLock<Option<Arc<dyn WalletBridge>>>,
    storage: Option<SessionStorage>,
    options: GatewayOptions,
    signing: AtomicBool,
    /// Bumped by `disconnect`; a connect that started earlier is discarded.
    epoch: AtomicU64,
}

impl ChainGateway {
    pub fn new(node: Arc<dyn NodeClient>, options: GatewayOptions) -> Self {
        Self {
            node,
            wallets: HashMap::new(),
            active: RwLock::new(None),
            storage: None,
            options,
            signing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Register a wallet provider.
    pub fn with_wallet(mut self, wallet: Arc<dyn WalletBridge>) -> Self {
        self.wallets.insert(wallet.provider(), wallet);
        self
    }

    /// Persist sessions to `storage`.
    pub fn with_storage(mut self, storage: SessionStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn node(&self) -> Arc<dyn NodeClient> {
        self.node.clone()
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.active.read().is_some()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Ask `provider` for an identification certificate and open a session.
    pub async fn connect(&self, provider: ProviderId) -> Result<Session, GatewayError> {
        let wallet = self
            .wallets
            .get(&provider)
            .cloned()
            .ok_or_else(|| GatewayError::ExtensionNotDetected(provider.to_string()))?;
        let epoch = self.epoch.load(Ordering::Acquire);

        let certificate = {
            let _guard = self.begin_signing()?;
            wallet
                .sign_certificate(&CertificateMessage::identification())
                .await?
        };
        let account = self.verify_certificate(&certificate)?;

        // Activation and persistence happen under the same lock `disconnect`
        // takes, so a disconnect either precedes the epoch check or follows
        // the save.
        {
            let mut active = self.active.write();
            if self.epoch.load(Ordering::Acquire) != epoch {
                info!(provider = %provider, "Connect superseded by disconnect");
                return Err(GatewayError::Cancelled);
            }
            *active = Some(wallet);

            if let Some(storage) = &self.storage {
                let record = PersistedSession {
                    wallet_id: provider,
                    cert: certificate.clone(),
                };
                if let Err(e) = storage.save(&record) {
                    warn!(error = %e, "Failed to persist session");
                }
            }
        }

        info!(provider = %provider, account = %account, "Wallet connected");
        Ok(Session {
            provider,
            account,
            certificate,
        })
    }

    /// Re-open the persisted session without prompting.
    ///
    /// Any failure clears the stored record and yields `None`.
    pub fn restore_session(&self) -> Option<Session> {
        let storage = self.storage.as_ref()?;

        match self.try_restore(storage) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding stored session");
                if let Err(e) = storage.clear() {
                    warn!(error = %e, "Failed to clear stored session");
                }
                None
            }
        }
    }

    fn try_restore(&self, storage: &SessionStorage) -> Result<Option<Session>, GatewayError> {
        let Some(record) = storage.load()? else {
            return Ok(None);
        };

        let wallet = self
            .wallets
            .get(&record.wallet_id)
            .cloned()
            .ok_or_else(|| GatewayError::ExtensionNotDetected(record.wallet_id.to_string()))?;
        let account = self.verify_certificate(&record.cert)?;

        *self.active.write() = Some(wallet);
        info!(provider = %record.wallet_id, account = %account, "Session restored");

        Ok(Some(Session {
            provider: record.wallet_id,
            account,
            certificate: record.cert,
        }))
    }

    /// Drop the active wallet and the stored record.
    pub fn disconnect(&self) {
        {
            let mut active = self.active.write();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *active = None;
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.clear() {
                    warn!(error = %e, "Failed to clear stored session");
                }
            }
        }
        info!("Wallet disconnected");
    }

    fn begin_signing(&self) -> Result<SigningGuard<'_>, GatewayError> {
        self.signing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GatewayError::AlreadySigning)?;
        Ok(SigningGuard(&self.signing))
    }

    fn verify_certificate(&self, certificate: &Certificate) -> Result<Address, GatewayError> {
        if certificate.purpose != IDENTIFICATION_PURPOSE {
            return Err(GatewayError::InvalidCertificate(format!(
                "unexpected purpose {}",
                certificate.purpose
            )));
        }
        if certificate.domain != self.options.domain {
            return Err(GatewayError::InvalidCertificate(format!(
                "issued for {}, expected {}",
                certificate.domain, self.options.domain
            )));
        }
        certificate.verify()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fail unless the node's genesis id ends in `expected`.
    pub async fn verify_chain_tag(&self, expected: u8) -> Result<(), GatewayError> {
        let genesis = self.node.block(BlockRevision::Number(0)).await?;
        let tag = genesis.id[31];
        if tag != expected {
            return Err(GatewayError::Network(format!(
                "node chain tag {tag:#04x}, expected {expected:#04x}"
            )));
        }
        Ok(())
    }

    pub async fn read_balance(&self, account: Address) -> Result<Balance, GatewayError> {
        let info = self.node.account(account).await?;
        Ok(Balance::new(info.balance, info.energy))
    }

    /// Typed read-only contract call. Never prompts the wallet.
    pub async fn read_contract_value<C: SolCall + Sync>(
        &self,
        to: Address,
        call: &C,
    ) -> Result<C::Return, GatewayError> {
        let clause = contracts::build_clause(to, call);
        let outputs = self.node.call(std::slice::from_ref(&clause), None).await?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode(format!("{}: no output", C::SIGNATURE)))?;

        if output.reverted {
            return Err(GatewayError::Network(format!(
                "{} reverted: {}",
                C::SIGNATURE,
                output.vm_error
            )));
        }
        decode_return::<C>(&output.data)
    }

    pub fn build_clause<C: SolCall>(&self, to: Address, call: &C) -> Clause {
        contracts::build_clause(to, call)
    }

    /// Reserves of a VTHO/VET pair, oriented VTHO in, VET out.
    pub async fn read_pool_reserves(
        &self,
        pair: Address,
        energy: Address,
    ) -> Result<PoolReserves, GatewayError> {
        let token0 = self
            .read_contract_value(pair, &IUniswapV2Pair::token0Call {})
            .await?;
        let reserves = self
            .read_contract_value(pair, &IUniswapV2Pair::getReservesCall {})
            .await?;

        let reserve0 = U256::from(reserves.reserve0);
        let reserve1 = U256::from(reserves.reserve1);
        let (reserve_in, reserve_out) = if token0 == energy {
            (reserve0, reserve1)
        } else {
            (reserve1, reserve0)
        };
        Ok(PoolReserves {
            reserve_in,
            reserve_out,
        })
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Send one signing request to the active wallet.
    pub async fn sign_transaction(
        &self,
        clauses: Vec<Clause>,
        signer: Option<Address>,
        comment: String,
    ) -> Result<B256, GatewayError> {
        let wallet = self.active.read().clone().ok_or(GatewayError::NotConnected)?;

        let _guard = self.begin_signing()?;

        debug!(clauses = clauses.len(), comment = %comment, "Requesting signature");
        let response = wallet
            .sign_transaction(&TxRequest {
                clauses,
                signer,
                comment,
            })
            .await?;
        Ok(response.tx_id)
    }

    /// Poll for a receipt once per new block, up to `max_blocks` blocks.
    pub async fn await_receipt(
        &self,
        tx_id: B256,
        max_blocks: u32,
        cancel: &CancellationToken,
    ) -> Result<Receipt, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let mut ticker = BlockTicker::start(self.node.clone(), self.options.block_poll_interval).await?;

        for attempt in 1..=max_blocks {
            let block = ticker.next(cancel).await?;
            if let Some(receipt) = self.node.receipt(tx_id).await? {
                if receipt.reverted {
                    warn!(tx_id = %tx_id, block = receipt.meta.block_number, "Transaction reverted");
                    return Err(GatewayError::TransactionReverted);
                }
                info!(tx_id = %tx_id, block = receipt.meta.block_number, "Transaction mined");
                return Ok(receipt);
            }
            debug!(tx_id = %tx_id, block = block.number, attempt, "Receipt not yet available");
        }

        warn!(tx_id = %tx_id, max_blocks, "Transaction not found");
        Err(GatewayError::TransactionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = GatewayOptions::default();
        assert_eq!(options.max_blocks_to_wait, 5);
        assert_eq!(options.block_poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_signing_guard_resets_flag() {
        let flag = AtomicBool::new(true);
        {
            let _guard = SigningGuard(&flag);
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
