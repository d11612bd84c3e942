//! Reserve config store: the account's swap policy on the Trader contract.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use vearn_chain::contracts::{IEnergy, ITrader, APPROVE_COMMENT, SAVE_CONFIG_COMMENT};
use vearn_chain::{join_comments, ChainGateway, Contracts, GatewayError};
use vearn_common::ReserveConfig;

use super::allowance::AllowanceStore;
use super::balance::{BalanceState, BalanceStore};
use super::observable::{Generation, Store};
use super::tx::{sign_and_confirm, TxStatus};
use super::wallet::WalletStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReserveConfigState {
    pub account: Option<Address>,
    pub config: ReserveConfig,
    pub fetched: bool,
    pub tx: TxStatus,
    pub error: Option<String>,
}

pub struct ReserveConfigStore {
    gateway: Arc<ChainGateway>,
    contracts: Contracts,
    wallet: Arc<WalletStore>,
    allowance: Arc<AllowanceStore>,
    store: Store<ReserveConfigState>,
    generation: Generation,
}

impl ReserveConfigStore {
    pub fn new(
        gateway: Arc<ChainGateway>,
        contracts: Contracts,
        wallet: Arc<WalletStore>,
        balance: &BalanceStore,
        allowance: Arc<AllowanceStore>,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            gateway,
            contracts,
            wallet,
            allowance,
            store: Store::new(ReserveConfigState::default()),
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

    pub fn store(&self) -> &Store<ReserveConfigState> {
        &self.store
    }

    pub fn state(&self) -> ReserveConfigState {
        self.store.get()
    }

    pub fn config(&self) -> ReserveConfig {
        self.store.with(|s| s.config)
    }

    // Fetched once per account and retried on later balance updates until it
    // succeeds; the config only changes through this store.
    fn on_balance_change(self: &Arc<Self>, balance: &BalanceState) {
        if balance.account != self.store.with(|s| s.account) {
            self.generation.bump();
            self.store.set(ReserveConfigState {
                account: balance.account,
                ..ReserveConfigState::default()
            });
        }

        let needs_fetch = balance.fetched && self.store.with(|s| !s.fetched);
        if needs_fetch {
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
                debug!(error = %e, "Reserve config refresh skipped");
            }
        });
    }

    pub async fn refresh(&self) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.current();

        let call = ITrader::addressToConfigCall {
            account: session.account,
        };
        let result = self.gateway.read_contract_value(self.contracts.trader, &call).await;
        if !self.generation.is_current(generation) {
            return Ok(());
        }

        match result {
            Ok(config) => {
                let config = ReserveConfig::new(config.triggerBalance, config.reserveBalance);
                debug!(
                    trigger = %config.trigger_balance,
                    reserve = %config.reserve_balance,
                    "Reserve config loaded"
                );
                self.store.update(|s| {
                    s.config = config;
                    s.fetched = true;
                    s.error = None;
                });
            }
            Err(e) => {
                warn!(error = %e, "Reserve config refresh failed");
                self.store.update(|s| s.error = Some(e.to_string()));
            }
        }
        Ok(())
    }

    /// Save a new swap policy, approving the Trader contract in the same
    /// transaction when it is not yet allowed to spend VTHO.
    ///
    /// Only `NotConnected` is returned; other failures land in `error`.
    pub async fn set_reserve_config(
        &self,
        trigger_balance: U256,
        reserve_balance: U256,
    ) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.current();

        if reserve_balance >= trigger_balance {
            self.store.update(|s| {
                s.error = Some("Reserve balance must be lower than the trigger balance".to_string())
            });
            return Ok(());
        }

        let mut clauses = Vec::with_capacity(2);
        let mut comments = Vec::with_capacity(2);
        if !self.allowance.is_allowed() {
            clauses.push(self.gateway.build_clause(
                self.contracts.energy,
                &IEnergy::approveCall {
                    spender: self.contracts.trader,
                    value: U256::MAX,
                },
            ));
            comments.push(APPROVE_COMMENT);
        }
        clauses.push(self.gateway.build_clause(
            self.contracts.trader,
            &ITrader::saveConfigCall {
                triggerBalance: trigger_balance,
                reserveBalance: reserve_balance,
            },
        ));
        comments.push(SAVE_CONFIG_COMMENT);

        self.store.update(|s| s.error = None);
        let report = |status: TxStatus| {
            if self.generation.is_current(generation) {
                self.store.update(|s| s.tx = status);
            }
        };

        let cancel = self.wallet.session_token();
        let result = sign_and_confirm(
            &self.gateway,
            clauses,
            session.account,
            join_comments(&comments),
            &cancel,
            report,
        )
        .await;

        match result {
            Ok(_) => {
                info!(
                    account = %session.account,
                    trigger = %trigger_balance,
                    reserve = %reserve_balance,
                    "Reserve config saved"
                );
                let (config, allowance) = tokio::join!(self.refresh(), self.allowance.refresh());
                for e in [config.err(), allowance.err()].into_iter().flatten() {
                    debug!(error = %e, "Refresh after save skipped");
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
