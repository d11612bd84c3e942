//! VeChain integration library for the vearn client.
//!
//! Provides the chain gateway, the only component that talks to wallets and
//! the Thor node:
//! - Thor REST client (`thor`) and an in-memory node (`memory`)
//! - Typed contract ABIs and clause construction (`contracts`)
//! - VeChain transaction encoding and signing (`tx`)
//! - Identification certificates (`certificate`)
//! - Wallet bridges: local key and remote relay (`wallet`)
//! - Block ticker for receipt polling (`ticker`)
//! - Persisted session record (`storage`)
//!
//! Used by `vearn-app` to back its reactive stores.

pub mod certificate;
pub mod contracts;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod storage;
pub mod thor;
pub mod ticker;
pub mod tx;
pub mod wallet;

pub use certificate::{Certificate, CertificateMessage, CertificatePayload};
pub use contracts::{build_clause, join_comments, Clause, Contracts, ENERGY_ADDRESS};
pub use error::GatewayError;
pub use gateway::{ChainGateway, GatewayOptions, Session};
pub use memory::{MemoryNode, ReceiptOutcome};
pub use storage::{PersistedSession, SessionStorage, SESSION_FILE};
pub use thor::{AccountInfo, BlockRevision, BlockSummary, CallOutput, NodeClient, Receipt, ThorClient};
pub use ticker::BlockTicker;
pub use wallet::{LocalWallet, ProviderId, RelayWallet, TxRequest, TxResponse, WalletBridge};
