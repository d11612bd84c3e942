//! Reactive state stores.
//!
//! Each store holds one piece of client state and recomputes when the store
//! it depends on changes:
//!
//! ```text
//! Wallet -> Balance -> { Allowance, ReserveConfig, TradesForecast }
//!                       ReserveConfig -> TradesForecast
//! ```
//!
//! ## Contracts
//!
//! - Disconnecting resets every dependent store before `disconnect` returns.
//! - Async results are applied only if no newer upstream change or reset
//!   happened in the meantime.
//! - Gateway failures are recorded in each store's `error` field. Only
//!   `NotConnected` is returned to callers.

pub mod allowance;
pub mod balance;
pub mod forecast;
pub mod observable;
pub mod reserve;
pub mod tx;
pub mod wallet;

use std::sync::Arc;

use vearn_chain::{ChainGateway, Contracts};

use crate::forecast::ForecastSource;

pub use allowance::{AllowanceState, AllowanceStore};
pub use balance::{BalanceState, BalanceStore};
pub use forecast::{ForecastState, TradesForecastStore};
pub use observable::{Generation, Store};
pub use reserve::{ReserveConfigState, ReserveConfigStore};
pub use tx::TxStatus;
pub use wallet::{WalletState, WalletStatus, WalletStore};

/// The wired store graph.
pub struct Stores {
    pub wallet: Arc<WalletStore>,
    pub balance: Arc<BalanceStore>,
    pub allowance: Arc<AllowanceStore>,
    pub reserve: Arc<ReserveConfigStore>,
    pub forecast: Arc<TradesForecastStore>,
}

impl Stores {
    pub fn new(
        gateway: Arc<ChainGateway>,
        contracts: Contracts,
        forecast_source: Arc<dyn ForecastSource>,
    ) -> Self {
        let wallet = WalletStore::new(gateway.clone());
        let balance = BalanceStore::new(gateway.clone(), wallet.clone());
        let allowance = AllowanceStore::new(gateway.clone(), contracts, wallet.clone(), &balance);
        let reserve = ReserveConfigStore::new(
            gateway.clone(),
            contracts,
            wallet.clone(),
            &balance,
            allowance.clone(),
        );
        let forecast = TradesForecastStore::new(
            gateway,
            contracts,
            forecast_source,
            wallet.clone(),
            balance.clone(),
            reserve.clone(),
        );

        Self {
            wallet,
            balance,
            allowance,
            reserve,
            forecast,
        }
    }
}
