//! Allowance store: whether the Trader contract may spend the account's VTHO.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use vearn_chain::contracts::{IEnergy, APPROVE_COMMENT, REVOKE_COMMENT};
use vearn_chain::{ChainGateway, Contracts, GatewayError};

use super::balance::{BalanceState, BalanceStore};
use super::observable::{Generation, Store};
use super::tx::{sign_and_confirm, TxStatus};
use super::wallet::WalletStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowanceState {
    pub account: Option<Address>,
    /// Non-zero allowance.
    pub allowed: bool,
    pub fetched: bool,
    pub tx: TxStatus,
    pub error: Option<String>,
}

pub struct AllowanceStore {
    gateway: Arc<ChainGateway>,
    contracts: Contracts,
    wallet: Arc<WalletStore>,
    store: Store<AllowanceState>,
    generation: Generation,
}

impl AllowanceStore {
    pub fn new(
        gateway: Arc<ChainGateway>,
        contracts: Contracts,
        wallet: Arc<WalletStore>,
        balance: &BalanceStore,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            gateway,
            contracts,
            wallet,
            store: Store::new(AllowanceState::default()),
            generation: Generation::default(),
        });

        let weak = Arc::downgrade(&this);
        balance.store().listen(move |state| {
            if let Some(this) = weak.upgrade() {
                this.on_balance_change(state);
            }
        });
        this
    }

    pub fn store(&self) -> &Store<AllowanceState> {
        &self.store
    }

    pub fn state(&self) -> AllowanceState {
        self.store.get()
    }

    pub fn is_allowed(&self) -> bool {
        self.store.with(|s| s.allowed)
    }

    fn on_balance_change(self: &Arc<Self>, balance: &BalanceState) {
        let own_account = self.store.with(|s| s.account);

        if balance.account != own_account {
            self.generation.bump();
            self.store.set(AllowanceState {
                account: balance.account,
                ..AllowanceState::default()
            });
        }

        let changed = balance.account != own_account || balance.current != balance.previous;
        if balance.fetched && changed {
            self.spawn_refresh();
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            if let Err(e) = this.refresh().await {
                debug!(error = %e, "Allowance refresh skipped");
            }
        });
    }

    pub async fn refresh(&self) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.current();

        let call = IEnergy::allowanceCall {
            owner: session.account,
            spender: self.contracts.trader,
        };
        let result = self.gateway.read_contract_value(self.contracts.energy, &call).await;
        if !self.generation.is_current(generation) {
            return Ok(());
        }

        match result {
            Ok(allowance) => self.store.update(|s| {
                s.allowed = !allowance.is_zero();
                s.fetched = true;
                s.error = None;
            }),
            Err(e) => {
                warn!(error = %e, "Allowance refresh failed");
                self.store.update(|s| s.error = Some(e.to_string()));
            }
        }
        Ok(())
    }

    /// Approve (unlimited) or revoke the Trader contract's allowance.
    ///
    /// Only `NotConnected` is returned; other failures land in `error`.
    pub async fn set_allowance(&self, approve: bool) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.current();
        let cancel = self.wallet.session_token();

        let value = if approve { U256::MAX } else { U256::ZERO };
        let clause = self.gateway.build_clause(
            self.contracts.energy,
            &IEnergy::approveCall {
                spender: self.contracts.trader,
                value,
            },
        );
        let comment = if approve { APPROVE_COMMENT } else { REVOKE_COMMENT };

        self.store.update(|s| s.error = None);
        let report = |status: TxStatus| {
            if self.generation.is_current(generation) {
                self.store.update(|s| s.tx = status);
            }
        };

        let result = sign_and_confirm(
            &self.gateway,
            vec![clause],
            session.account,
            comment.to_string(),
            &cancel,
            report,
        )
        .await;

        match result {
            Ok(_) => {
                info!(account = %session.account, approve, "Allowance updated");
                if let Err(e) = self.refresh().await {
                    debug!(error = %e, "Allowance refresh skipped");
                }
            }
            Err(e) => {
                if self.generation.is_current(generation) {
                    self.store.update(|s| s.error = Some(e.to_string()));
                }
            }
        }
        Ok(())
    }
}
