//! Wallet store: the root of the store graph.

use std::sync::Arc;

use alloy::primitives::Address;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vearn_chain::{ChainGateway, GatewayError, ProviderId, Session};

use super::observable::{Generation, Store};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WalletState {
    #[default]
    Disconnected,
    Connected(Session),
}

impl WalletState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            WalletState::Connected(session) => Some(session),
            WalletState::Disconnected => None,
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.session().map(|s| s.account)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletStatus {
    pub state: WalletState,
    /// A connect request is waiting on the wallet.
    pub connecting: bool,
    pub error: Option<String>,
}

pub struct WalletStore {
    gateway: Arc<ChainGateway>,
    store: Store<WalletStatus>,
    generation: Generation,
    /// Cancelled whenever the session ends or is replaced.
    session_token: Mutex<CancellationToken>,
}

impl WalletStore {
    pub fn new(gateway: Arc<ChainGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            store: Store::new(WalletStatus::default()),
            generation: Generation::default(),
            session_token: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn store(&self) -> &Store<WalletStatus> {
        &self.store
    }

    pub fn status(&self) -> WalletStatus {
        self.store.get()
    }

    pub fn account(&self) -> Option<Address> {
        self.store.with(|s| s.state.account())
    }

    /// The active session, or `NotConnected`.
    pub fn require_session(&self) -> Result<Session, GatewayError> {
        self.store
            .with(|s| s.state.session().cloned())
            .ok_or(GatewayError::NotConnected)
    }

    /// Token for work bound to the current session.
    pub fn session_token(&self) -> CancellationToken {
        self.session_token.lock().child_token()
    }

    fn renew_session_token(&self) {
        let mut token = self.session_token.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Ask `provider` for a certificate and open a session.
    ///
    /// Failures are recorded in the `error` field.
    pub async fn connect(&self, provider: ProviderId) -> Option<Session> {
        let generation = self.generation.bump();
        self.store.update(|s| {
            s.connecting = true;
            s.error = None;
        });

        let result = self.gateway.connect(provider).await;
        if !self.generation.is_current(generation) {
            // superseded by a disconnect or another connect
            return None;
        }

        match result {
            Ok(session) => {
                self.renew_session_token();
                self.store.set(WalletStatus {
                    state: WalletState::Connected(session.clone()),
                    connecting: false,
                    error: None,
                });
                Some(session)
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "Connect failed");
                self.store.update(|s| {
                    s.connecting = false;
                    s.error = Some(e.to_string());
                });
                None
            }
        }
    }

    /// Restore the persisted session, if any, without prompting.
    pub fn restore(&self) -> Option<Session> {
        let session = self.gateway.restore_session()?;
        self.generation.bump();
        self.renew_session_token();
        info!(account = %session.account, "Session restored");
        self.store.set(WalletStatus {
            state: WalletState::Connected(session.clone()),
            connecting: false,
            error: None,
        });
        Some(session)
    }

    /// End the session. Dependent stores reset before this returns.
    pub fn disconnect(&self) {
        self.generation.bump();
        self.renew_session_token();
        self.gateway.disconnect();
        self.store.set(WalletStatus::default());
    }
}
