//! Configuration for the vearn client.
//!
//! Loaded from a TOML file, then overridden by environment variables and
//! CLI flags. Network presets provide the node URL, chain tag and VTHO
//! contract; the Trader contract, DEX pair and forecast endpoint must come
//! from the file or the environment.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use vearn_chain::{Contracts, ProviderId, ENERGY_ADDRESS};

/// Domain certificates are issued for.
pub const DEFAULT_DOMAIN: &str = "vearn";

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Selected network preset.
    pub network: NetworkId,

    /// Logging level.
    pub log_level: String,

    /// Directory holding the persisted session.
    pub data_dir: PathBuf,

    pub wallet: WalletConfig,

    pub polling: PollingConfig,

    /// Per-network values from the `[network.<id>]` tables.
    networks: HashMap<NetworkId, NetworkOverrides>,

    /// Environment and CLI values, applied over the file for any network.
    overrides: NetworkOverrides,
}

/// Known chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
    Main,
    Test,
}

impl FromStr for NetworkId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "main" | "mainnet" => Ok(NetworkId::Main),
            "test" | "testnet" => Ok(NetworkId::Test),
            other => bail!("Unknown network: {other} (expected main or test)"),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Main => write!(f, "main"),
            NetworkId::Test => write!(f, "test"),
        }
    }
}

impl NetworkId {
    fn node_url(&self) -> &'static str {
        match self {
            NetworkId::Main => "https://mainnet.vechain.org",
            NetworkId::Test => "https://testnet.vechain.org",
        }
    }

    /// Last byte of the genesis block id.
    pub fn chain_tag(&self) -> u8 {
        match self {
            NetworkId::Main => 0x4a,
            NetworkId::Test => 0x27,
        }
    }
}

/// Wallet provider settings.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub provider: ProviderId,

    /// Signing relay base URL (relay provider only).
    pub relay_url: Option<String>,

    /// How long to wait for the user to answer a signing request.
    pub signing_timeout: Duration,

    /// Certificate domain.
    pub domain: String,

    /// Hex private key (local provider only). Environment only.
    pub private_key: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            provider: ProviderId::Local,
            relay_url: None,
            signing_timeout: Duration::from_secs(300),
            domain: DEFAULT_DOMAIN.to_string(),
            private_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Balance refresh interval.
    pub balance_interval: Duration,

    /// Best-block poll interval while waiting for receipts.
    pub block_poll_interval: Duration,

    /// Blocks to wait for a receipt before reporting it missing.
    pub max_blocks_to_wait: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            balance_interval: Duration::from_secs(10),
            block_poll_interval: Duration::from_secs(2),
            max_blocks_to_wait: 5,
        }
    }
}

/// Optional per-network values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkOverrides {
    pub node_url: Option<String>,
    pub trader: Option<String>,
    pub pair: Option<String>,
    pub forecast_url: Option<String>,
}

impl NetworkOverrides {
    fn merge(&mut self, other: &NetworkOverrides) {
        if other.node_url.is_some() {
            self.node_url = other.node_url.clone();
        }
        if other.trader.is_some() {
            self.trader = other.trader.clone();
        }
        if other.pair.is_some() {
            self.pair = other.pair.clone();
        }
        if other.forecast_url.is_some() {
            self.forecast_url = other.forecast_url.clone();
        }
    }
}

/// Fully resolved chain settings for the selected network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub network: NetworkId,
    pub node_url: String,
    pub chain_tag: u8,
    pub contracts: Contracts,
    pub forecast_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkId::Main,
            log_level: "info".to_string(),
            data_dir: PathBuf::from(".vearn"),
            wallet: WalletConfig::default(),
            polling: PollingConfig::default(),
            networks: HashMap::new(),
            overrides: NetworkOverrides::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Self::try_from(file)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup("VEARN_NETWORK") {
            self.network = network.parse().context("VEARN_NETWORK")?;
        }
        if let Some(url) = lookup("VEARN_NODE_URL") {
            self.overrides.node_url = Some(url);
        }
        if let Some(trader) = lookup("VEARN_TRADER_ADDRESS") {
            self.overrides.trader = Some(trader);
        }
        if let Some(pair) = lookup("VEARN_PAIR_ADDRESS") {
            self.overrides.pair = Some(pair);
        }
        if let Some(url) = lookup("VEARN_FORECAST_URL") {
            self.overrides.forecast_url = Some(url);
        }

        // Wallet secrets are never read from the file
        if let Some(key) = lookup("VEARN_PRIVATE_KEY") {
            self.wallet.private_key = Some(key);
        }
        if let Some(url) = lookup("VEARN_RELAY_URL") {
            self.wallet.relay_url = Some(url);
        }
        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        network: Option<NetworkId>,
        node_url: Option<String>,
        provider: Option<ProviderId>,
    ) {
        if let Some(network) = network {
            self.network = network;
        }
        if let Some(url) = node_url {
            self.overrides.node_url = Some(url);
        }
        if let Some(provider) = provider {
            self.wallet.provider = provider;
        }
    }

    /// Resolve the chain settings of the selected network.
    pub fn chain(&self) -> Result<ChainConfig> {
        let mut values = self
            .networks
            .get(&self.network)
            .cloned()
            .unwrap_or_default();
        values.merge(&self.overrides);

        let trader = values.trader.as_deref().ok_or_else(|| {
            anyhow!(
                "Trader address missing: set [network.{}].trader or VEARN_TRADER_ADDRESS",
                self.network
            )
        })?;
        let pair = values.pair.as_deref().ok_or_else(|| {
            anyhow!(
                "Pair address missing: set [network.{}].pair or VEARN_PAIR_ADDRESS",
                self.network
            )
        })?;
        let forecast_url = values.forecast_url.clone().ok_or_else(|| {
            anyhow!(
                "Forecast URL missing: set [network.{}].forecast_url or VEARN_FORECAST_URL",
                self.network
            )
        })?;

        Ok(ChainConfig {
            network: self.network,
            node_url: values
                .node_url
                .unwrap_or_else(|| self.network.node_url().to_string()),
            chain_tag: self.network.chain_tag(),
            contracts: Contracts {
                energy: ENERGY_ADDRESS,
                trader: parse_address("trader", trader)?,
                pair: Some(parse_address("pair", pair)?),
            },
            forecast_url,
        })
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        self.chain()?;

        if self.wallet.provider == ProviderId::Relay
            && self.wallet.relay_url.as_deref().map_or(true, str::is_empty)
        {
            bail!("Relay provider requires relay_url or VEARN_RELAY_URL");
        }
        if self.wallet.signing_timeout.is_zero() {
            bail!("signing_timeout_secs must be positive");
        }
        if self.wallet.domain.trim().is_empty() {
            bail!("wallet domain must not be empty");
        }

        if self.polling.balance_interval.is_zero() {
            bail!("balance_interval_secs must be positive");
        }
        if self.polling.block_poll_interval.is_zero() {
            bail!("block_poll_interval_secs must be positive");
        }
        if self.polling.max_blocks_to_wait == 0 {
            bail!("max_blocks_to_wait must be at least 1");
        }

        Ok(())
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("Invalid {name} address: {value}"))
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    wallet: WalletToml,
    #[serde(default)]
    network: HashMap<String, NetworkOverrides>,
    #[serde(default)]
    polling: PollingToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    network: String,
    log_level: String,
    data_dir: PathBuf,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            network: "main".to_string(),
            log_level: "info".to_string(),
            data_dir: PathBuf::from(".vearn"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WalletToml {
    provider: String,
    relay_url: Option<String>,
    signing_timeout_secs: u64,
    domain: String,
}

impl Default for WalletToml {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            relay_url: None,
            signing_timeout_secs: 300,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PollingToml {
    balance_interval_secs: u64,
    block_poll_interval_secs: u64,
    max_blocks_to_wait: u32,
}

impl Default for PollingToml {
    fn default() -> Self {
        Self {
            balance_interval_secs: 10,
            block_poll_interval_secs: 2,
            max_blocks_to_wait: 5,
        }
    }
}

impl TryFrom<TomlConfig> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(toml: TomlConfig) -> Result<Self> {
        let networks = toml
            .network
            .into_iter()
            .map(|(id, values)| Ok((id.parse::<NetworkId>()?, values)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            network: toml.general.network.parse()?,
            log_level: toml.general.log_level,
            data_dir: toml.general.data_dir,
            wallet: WalletConfig {
                provider: toml
                    .wallet
                    .provider
                    .parse()
                    .map_err(|e| anyhow!("[wallet].provider: {e}"))?,
                relay_url: toml.wallet.relay_url,
                signing_timeout: Duration::from_secs(toml.wallet.signing_timeout_secs),
                domain: toml.wallet.domain,
                private_key: None,
            },
            polling: PollingConfig {
                balance_interval: Duration::from_secs(toml.polling.balance_interval_secs),
                block_poll_interval: Duration::from_secs(toml.polling.block_poll_interval_secs),
                max_blocks_to_wait: toml.polling.max_blocks_to_wait,
            },
            networks,
            overrides: NetworkOverrides::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TRADER: &str = "0x1111111111111111111111111111111111111111";
    const PAIR: &str = "0x2222222222222222222222222222222222222222";

    fn complete_toml() -> String {
        format!(
            r#"
            [general]
            network = "test"
            log_level = "debug"
            data_dir = "/tmp/vearn"

            [wallet]
            provider = "relay"
            relay_url = "https://relay.example"
            signing_timeout_secs = 60

            [network.test]
            trader = "{TRADER}"
            pair = "{PAIR}"
            forecast_url = "https://api.example/trades-forecast"

            [polling]
            balance_interval_secs = 30
        "#
        )
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.network, NetworkId::Main);
        assert_eq!(config.wallet.provider, ProviderId::Local);
        assert_eq!(config.polling.max_blocks_to_wait, 5);
        assert_eq!(config.data_dir, PathBuf::from(".vearn"));
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("main".parse::<NetworkId>().unwrap(), NetworkId::Main);
        assert_eq!("TESTNET".parse::<NetworkId>().unwrap(), NetworkId::Test);
        assert!("solo".parse::<NetworkId>().is_err());
        assert_eq!(NetworkId::Test.to_string(), "test");
    }

    #[test]
    fn test_parse_toml() {
        let config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        assert_eq!(config.network, NetworkId::Test);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/vearn"));
        assert_eq!(config.wallet.provider, ProviderId::Relay);
        assert_eq!(config.wallet.signing_timeout, Duration::from_secs(60));
        assert_eq!(config.polling.balance_interval, Duration::from_secs(30));
        assert_eq!(config.polling.block_poll_interval, Duration::from_secs(2));

        let chain = config.chain().unwrap();
        assert_eq!(chain.node_url, "https://testnet.vechain.org");
        assert_eq!(chain.chain_tag, 0x27);
        assert_eq!(chain.contracts.energy, ENERGY_ADDRESS);
        assert_eq!(
            chain.contracts.trader,
            address!("1111111111111111111111111111111111111111")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_network_table_rejected() {
        let toml = r#"
            [network.solo]
            node_url = "http://localhost:8669"
        "#;
        assert!(AppConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_missing_trader_fails_validation() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VEARN_TRADER_ADDRESS"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        let env: HashMap<&str, &str> = [
            ("VEARN_NETWORK", "main"),
            ("VEARN_NODE_URL", "http://localhost:8669"),
            ("VEARN_TRADER_ADDRESS", TRADER),
            ("VEARN_PAIR_ADDRESS", PAIR),
            ("VEARN_FORECAST_URL", "http://localhost:3000/forecast"),
            ("VEARN_PRIVATE_KEY", "0xabc"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.network, NetworkId::Main);
        assert_eq!(config.wallet.private_key.as_deref(), Some("0xabc"));

        let chain = config.chain().unwrap();
        assert_eq!(chain.node_url, "http://localhost:8669");
        assert_eq!(chain.chain_tag, 0x4a);
        assert_eq!(chain.forecast_url, "http://localhost:3000/forecast");
    }

    #[test]
    fn test_invalid_env_network() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides_from(|key| {
            (key == "VEARN_NETWORK").then(|| "solo".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        config.apply_cli_overrides(
            Some(NetworkId::Test),
            Some("http://override:8669".to_string()),
            Some(ProviderId::Local),
        );

        assert_eq!(config.wallet.provider, ProviderId::Local);
        assert_eq!(config.chain().unwrap().node_url, "http://override:8669");
    }

    #[test]
    fn test_validate_relay_requires_url() {
        let mut config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        config.wallet.relay_url = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_address() {
        let mut config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        config.overrides.trader = Some("0x1234".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_polling() {
        let mut config = AppConfig::from_toml_str(&complete_toml()).unwrap();
        config.polling.max_blocks_to_wait = 0;
        assert!(config.validate().is_err());
    }
}
