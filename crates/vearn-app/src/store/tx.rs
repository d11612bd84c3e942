//! Shared sign-and-confirm flow for mutation stores.
//!
//! `Idle -> Signing -> Pending(id) -> Mined | Reverted | NotFound`, falling
//! back to `Idle` when the wallet rejects the request or the wait is
//! cancelled.

use alloy::primitives::{Address, B256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vearn_chain::{ChainGateway, Clause, GatewayError, Receipt};

/// Progress of a store's pending transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TxStatus {
    #[default]
    Idle,
    Signing,
    Pending(B256),
    Mined(Receipt),
    Reverted,
    NotFound,
}

/// Sign `clauses`, wait for the receipt, and report each step.
pub async fn sign_and_confirm(
    gateway: &ChainGateway,
    clauses: Vec<Clause>,
    signer: Address,
    comment: String,
    cancel: &CancellationToken,
    report: impl Fn(TxStatus),
) -> Result<Receipt, GatewayError> {
    report(TxStatus::Signing);

    let tx_id = match gateway.sign_transaction(clauses, Some(signer), comment).await {
        Ok(tx_id) => tx_id,
        Err(e) => {
            warn!(error = %e, "Signing failed");
            report(TxStatus::Idle);
            return Err(e);
        }
    };
    report(TxStatus::Pending(tx_id));

    let max_blocks = gateway.options().max_blocks_to_wait;
    match gateway.await_receipt(tx_id, max_blocks, cancel).await {
        Ok(receipt) => {
            info!(tx_id = %tx_id, block = receipt.meta.block_number, "Transaction confirmed");
            report(TxStatus::Mined(receipt.clone()));
            Ok(receipt)
        }
        Err(e) => {
            report(match e {
                GatewayError::TransactionReverted => TxStatus::Reverted,
                GatewayError::TransactionNotFound => TxStatus::NotFound,
                _ => TxStatus::Idle,
            });
            Err(e)
        }
    }
}
