//! Balance store: VET/VTHO of the connected account.
//!
//! Keeps the previous reading next to the current one so the forecast
//! store can tell whether the VET balance moved.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vearn_chain::{ChainGateway, GatewayError};
use vearn_common::Balance;

use super::observable::{Generation, Store};
use super::wallet::{WalletStatus, WalletStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceState {
    /// Account the balances belong to.
    pub account: Option<Address>,
    pub current: Balance,
    pub previous: Balance,
    /// At least one reading landed for `account`.
    pub fetched: bool,
    pub error: Option<String>,
}

pub struct BalanceStore {
    gateway: Arc<ChainGateway>,
    wallet: Arc<WalletStore>,
    store: Store<BalanceState>,
    generation: Generation,
}

impl BalanceStore {
    pub fn new(gateway: Arc<ChainGateway>, wallet: Arc<WalletStore>) -> Arc<Self> {
        let this = Arc::new(Self {
            gateway,
            wallet: wallet.clone(),
            store: Store::new(BalanceState::default()),
            generation: Generation::default(),
        });

        let weak = Arc::downgrade(&this);
        wallet.store().listen(move |status| {
            if let Some(this) = weak.upgrade() {
                this.on_wallet_change(status);
            }
        });
        this
    }

    pub fn store(&self) -> &Store<BalanceState> {
        &self.store
    }

    pub fn state(&self) -> BalanceState {
        self.store.get()
    }

    fn on_wallet_change(self: &Arc<Self>, status: &WalletStatus) {
        let account = status.state.account();
        if account == self.store.with(|s| s.account) {
            return;
        }

        self.generation.bump();
        self.store.set(BalanceState {
            account,
            ..BalanceState::default()
        });
        if account.is_some() {
            self.spawn_refresh();
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime; balance refresh skipped");
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            if let Err(e) = this.refresh().await {
                debug!(error = %e, "Balance refresh skipped");
            }
        });
    }

    /// Read balances for the connected account.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.bump();

        let result = self.gateway.read_balance(session.account).await;
        if !self.generation.is_current(generation)
            || self.store.with(|s| s.account) != Some(session.account)
        {
            return Ok(());
        }

        match result {
            Ok(balance) => {
                debug!(account = %session.account, balance = %balance, "Balance updated");
                self.store.update(|s| {
                    s.previous = if s.fetched { s.current } else { balance };
                    s.current = balance;
                    s.fetched = true;
                    s.error = None;
                });
            }
            Err(e) => {
                warn!(account = %session.account, error = %e, "Balance refresh failed");
                self.store.update(|s| s.error = Some(e.to_string()));
            }
        }
        Ok(())
    }

    /// Refresh on a fixed interval until `cancel` fires.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match this.refresh().await {
                    Ok(()) | Err(GatewayError::NotConnected) => {}
                    Err(e) => warn!(error = %e, "Balance poll failed"),
                }
            }
            debug!("Balance polling stopped");
        })
    }
}
