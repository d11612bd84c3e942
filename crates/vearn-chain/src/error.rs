//! Error taxonomy for chain gateway operations.

use thiserror::Error;

/// Errors raised by the chain gateway.
///
/// Stores catch these at their boundary and keep the message for display;
/// only `NotConnected` is expected to reach callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The selected wallet provider is not available.
    #[error("Wallet not detected: {0}")]
    ExtensionNotDetected(String),

    /// The user declined the signing request, or it timed out.
    #[error("Request rejected by user")]
    UserRejected,

    /// The signed certificate failed local verification.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Transaction not found.")]
    TransactionNotFound,

    #[error("The transaction has been reverted.")]
    TransactionReverted,

    /// Caller contract violation: an operation needed a session.
    #[error("Wallet is not connected")]
    NotConnected,

    /// Node or HTTP failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Contract return data did not match the expected ABI.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A signing request is already waiting on the wallet.
    #[error("A signing request is already in progress")]
    AlreadySigning,

    #[error("Operation cancelled")]
    Cancelled,

    /// Persisted session could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}
