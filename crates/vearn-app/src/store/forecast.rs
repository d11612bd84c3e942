//! Trades forecast store.
//!
//! Fetches candidate solutions for the account, picks the one the balance
//! can fund, and grows it to the full spendable balance when pool reserves
//! are known. The forecast is re-fetched only when the VET balance moved;
//! VTHO-only changes and config changes recompute the selection from the
//! cached forecast.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use vearn_chain::{ChainGateway, Contracts, GatewayError};
use vearn_common::{
    choose_solution, compute_trade_amounts, exchange_rate, extend_solution, seconds_until_trigger,
    Balance, Forecast, PoolReserves, ReserveConfig, Solution, TradeAmounts, TradeParams,
};

use super::balance::{BalanceState, BalanceStore};
use super::observable::{Generation, Store};
use super::reserve::{ReserveConfigState, ReserveConfigStore};
use super::wallet::WalletStore;
use crate::forecast::ForecastSource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastState {
    pub account: Option<Address>,
    pub forecast: Forecast,
    pub fetched: bool,
    /// VET balance the last successful fetch was made for.
    pub fetched_vet: Option<U256>,
    pub pool: Option<PoolReserves>,
    /// Selected (and possibly extended) solution.
    pub solution: Option<Solution>,
    /// Amounts of the next swap under the current config.
    pub trade: Option<TradeAmounts>,
    pub seconds_until_trigger: Option<u64>,
    pub error: Option<String>,
}

pub struct TradesForecastStore {
    gateway: Arc<ChainGateway>,
    contracts: Contracts,
    source: Arc<dyn ForecastSource>,
    wallet: Arc<WalletStore>,
    balance: Arc<BalanceStore>,
    reserve: Arc<ReserveConfigStore>,
    store: Store<ForecastState>,
    generation: Generation,
}

impl TradesForecastStore {
    pub fn new(
        gateway: Arc<ChainGateway>,
        contracts: Contracts,
        source: Arc<dyn ForecastSource>,
        wallet: Arc<WalletStore>,
        balance: Arc<BalanceStore>,
        reserve: Arc<ReserveConfigStore>,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            gateway,
            contracts,
            source,
            wallet,
            balance: balance.clone(),
            reserve: reserve.clone(),
            store: Store::new(ForecastState::default()),
            generation: Generation::default(),
        });

        let weak = Arc::downgrade(&this);
        balance.store().listen(move |state| {
            if let Some(this) = weak.upgrade() {
                this.on_balance_change(state);
            }
        });
        let weak = Arc::downgrade(&this);
        reserve.store().listen(move |state| {
            if let Some(this) = weak.upgrade() {
                this.on_config_change(state);
            }
        });
        this
    }

    pub fn store(&self) -> &Store<ForecastState> {
        &self.store
    }

    pub fn state(&self) -> ForecastState {
        self.store.get()
    }

    fn on_balance_change(self: &Arc<Self>, balance: &BalanceState) {
        if balance.account != self.store.with(|s| s.account) {
            self.generation.bump();
            self.store.set(ForecastState {
                account: balance.account,
                ..ForecastState::default()
            });
        }
        if !balance.fetched {
            return;
        }

        // A failed fetch leaves `fetched_vet` empty so the next update retries.
        let stale = self
            .store
            .with(|s| s.fetched_vet != Some(balance.current.vet));
        if stale {
            self.spawn_refresh();
        } else {
            self.recompute();
        }
    }

    fn on_config_change(&self, config: &ReserveConfigState) {
        if config.account.is_some() && config.account == self.store.with(|s| s.account) {
            self.recompute();
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            if let Err(e) = this.refresh().await {
                debug!(error = %e, "Forecast refresh skipped");
            }
        });
    }

    /// Fetch the forecast and pool reserves, then reselect.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        let session = self.wallet.require_session()?;
        let generation = self.generation.bump();
        let vet = self.balance.store().with(|s| s.current.vet);

        let forecast = self.source.fetch(session.account).await;
        let pool = match self.contracts.pair {
            Some(pair) => match self.gateway.read_pool_reserves(pair, self.contracts.energy).await {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "Pool reserves unavailable");
                    None
                }
            },
            None => None,
        };

        if !self.generation.is_current(generation) {
            return Ok(());
        }

        self.store.update(|s| {
            match forecast {
                Ok(forecast) => {
                    debug!(solutions = forecast.solutions.len(), "Forecast updated");
                    s.forecast = forecast;
                    s.error = None;
                    s.fetched_vet = Some(vet);
                }
                Err(e) => {
                    warn!(error = %e, "Forecast fetch failed");
                    s.forecast = Forecast::default();
                    s.error = Some(e.to_string());
                    s.fetched_vet = None;
                }
            }
            s.fetched = true;
            s.pool = pool;
        });
        self.recompute();
        Ok(())
    }

    /// Reselect from the cached forecast using current balance and config.
    pub fn recompute(&self) {
        let balance = self.balance.store().with(|s| s.current);
        let config = self.reserve.config();

        self.store.update(|s| {
            if !s.fetched {
                return;
            }
            let (solution, trade, seconds) = select(&s.forecast, s.pool, balance, config);
            s.solution = solution;
            s.trade = trade;
            s.seconds_until_trigger = seconds;
        });
    }
}

fn select(
    forecast: &Forecast,
    pool: Option<PoolReserves>,
    balance: Balance,
    config: ReserveConfig,
) -> (Option<Solution>, Option<TradeAmounts>, Option<u64>) {
    let reserve = config.reserve_balance;

    let solution = choose_solution(balance.vtho, reserve, &forecast.solutions).map(|chosen| {
        match pool {
            Some(pool) => extend_solution(
                &chosen,
                balance.vtho,
                reserve,
                forecast.tx_fee,
                pool.reserve_in,
                pool.reserve_out,
            ),
            None => chosen,
        }
    });

    let trade = match (config.is_registered(), pool.and_then(exchange_rate)) {
        (true, Some(rate)) => Some(compute_trade_amounts(TradeParams {
            reserve_balance: config.reserve_balance,
            trigger_balance: config.trigger_balance,
            balance,
            tx_fee: forecast.tx_fee,
            exchange_rate: rate,
        })),
        _ => None,
    };

    let seconds = if config.is_registered() {
        seconds_until_trigger(balance, config.trigger_balance)
    } else {
        None
    };

    (solution, trade, seconds)
}
