//! vearn client core.
//!
//! Wires the chain gateway to a graph of reactive stores a front end can
//! render from:
//! - Configuration: TOML file + environment + CLI (`config`)
//! - Trades forecast HTTP client (`forecast`)
//! - Reactive state stores (`store`)

pub mod config;
pub mod forecast;
pub mod store;

pub use config::{AppConfig, ChainConfig, NetworkId};
pub use forecast::{ForecastClient, ForecastError, ForecastSource};
pub use store::Stores;
