//! vearn: command-line front end for the vearn client core.
//!
//! Usage:
//!   vearn [OPTIONS] <COMMAND>
//!
//! Commands:
//!   connect                     Sign an identification certificate and persist the session
//!   disconnect                  Forget the persisted session
//!   status                      Show balances, allowance, reserve config and forecast
//!   approve / revoke            Set the Trader contract's VTHO allowance
//!   save-config <TRIGGER> <RESERVE>
//!                               Save the swap policy (VTHO amounts)
//!   watch                       Poll balances and print forecast updates
//!
//! Options:
//!   -c, --config <FILE>         Config file path (default: config/vearn.toml)
//!   --network <NETWORK>         main or test (overrides config)
//!   --node-url <URL>            Thor node URL (overrides config)
//!   --provider <PROVIDER>       Wallet provider: local or relay (overrides config)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vearn_app::store::{ForecastState, TxStatus};
use vearn_app::{AppConfig, ChainConfig, ForecastClient, NetworkId, Stores};
use vearn_chain::{
    ChainGateway, GatewayOptions, LocalWallet, NodeClient, ProviderId, RelayWallet, SessionStorage,
    ThorClient,
};
use vearn_common::{format_units, parse_units, truncate, TOKEN_DECIMALS};

/// CLI arguments for vearn.
#[derive(Parser, Debug)]
#[command(name = "vearn")]
#[command(about = "Automated VTHO to VET swaps on VeChain")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/vearn.toml")]
    config: PathBuf,

    /// Network: main or test (overrides config file)
    #[arg(long)]
    network: Option<NetworkId>,

    /// Thor node URL (overrides config file)
    #[arg(long)]
    node_url: Option<String>,

    /// Wallet provider: local or relay (overrides config file)
    #[arg(long)]
    provider: Option<ProviderId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect a wallet and persist the session
    Connect,
    /// Forget the persisted session
    Disconnect,
    /// Show account state and the trades forecast
    Status,
    /// Allow the Trader contract to spend VTHO
    Approve,
    /// Revoke the Trader contract's VTHO allowance
    Revoke,
    /// Save the swap policy
    SaveConfig {
        /// Balance (VTHO) at which a swap is triggered
        trigger: String,
        /// Balance (VTHO) kept after each swap
        reserve: String,
    },
    /// Poll balances and print forecast updates until Ctrl-C
    Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let config_missing = !args.config.exists();
    let mut config = if config_missing {
        AppConfig::default()
    } else {
        AppConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    };
    config.apply_env_overrides()?;
    config.apply_cli_overrides(args.network, args.node_url, args.provider);

    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    if config_missing {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }

    config.validate().context("Configuration validation failed")?;
    let chain = config.chain()?;
    info!(network = %chain.network, node = %chain.node_url, "Starting vearn");

    let gateway = Arc::new(build_gateway(&config, &chain)?);
    if !matches!(args.command, Command::Disconnect) {
        gateway
            .verify_chain_tag(chain.chain_tag)
            .await
            .with_context(|| format!("Node at {} is not on {}", chain.node_url, chain.network))?;
    }
    let forecast = Arc::new(ForecastClient::new(&chain.forecast_url)?);
    let stores = Stores::new(gateway, chain.contracts, forecast);

    match args.command {
        Command::Connect => {
            let Some(session) = stores.wallet.connect(config.wallet.provider).await else {
                let error = stores.wallet.status().error.unwrap_or_default();
                bail!("Connect failed: {error}");
            };
            println!("Connected {} via {}", session.account, session.provider);
        }
        Command::Disconnect => {
            stores.wallet.restore();
            stores.wallet.disconnect();
            println!("Disconnected");
        }
        Command::Status => {
            restore(&stores)?;
            refresh_all(&stores).await?;
            print_status(&stores);
        }
        Command::Approve => set_allowance(&stores, true).await?,
        Command::Revoke => set_allowance(&stores, false).await?,
        Command::SaveConfig { trigger, reserve } => {
            let trigger = parse_units(&trigger, TOKEN_DECIMALS).context("Invalid trigger amount")?;
            let reserve = parse_units(&reserve, TOKEN_DECIMALS).context("Invalid reserve amount")?;
            restore(&stores)?;
            // batching the approve clause depends on the current allowance
            stores.allowance.refresh().await?;
            stores.reserve.set_reserve_config(trigger, reserve).await?;
            let state = stores.reserve.state();
            finish_tx(&state.tx, state.error)?;
            println!(
                "Saved: trigger {} VTHO, reserve {} VTHO",
                vtho(state.config.trigger_balance),
                vtho(state.config.reserve_balance)
            );
        }
        Command::Watch => {
            restore(&stores)?;
            watch(&stores, &config).await?;
        }
    }

    Ok(())
}

fn build_gateway(config: &AppConfig, chain: &ChainConfig) -> Result<ChainGateway> {
    let node: Arc<dyn NodeClient> = Arc::new(ThorClient::new(&chain.node_url, None)?);
    let options = GatewayOptions {
        domain: config.wallet.domain.clone(),
        block_poll_interval: config.polling.block_poll_interval,
        max_blocks_to_wait: config.polling.max_blocks_to_wait,
    };

    let mut gateway = ChainGateway::new(node.clone(), options)
        .with_storage(SessionStorage::new(&config.data_dir));

    if let Some(key) = &config.wallet.private_key {
        let wallet = LocalWallet::from_private_key(key, node, config.wallet.domain.clone())?;
        info!(address = %wallet.address(), "Local wallet loaded");
        gateway = gateway.with_wallet(Arc::new(wallet));
    }
    if let Some(url) = &config.wallet.relay_url {
        match RelayWallet::new(url, config.wallet.domain.clone(), config.wallet.signing_timeout) {
            Ok(wallet) => gateway = gateway.with_wallet(Arc::new(wallet)),
            Err(e) => warn!(error = %e, "Relay wallet unavailable"),
        }
    }
    Ok(gateway)
}

async fn set_allowance(stores: &Stores, approve: bool) -> Result<()> {
    restore(stores)?;
    stores.allowance.set_allowance(approve).await?;
    let state = stores.allowance.state();
    finish_tx(&state.tx, state.error)?;
    println!("Allowance {}", if state.allowed { "granted" } else { "revoked" });
    Ok(())
}

fn restore(stores: &Stores) -> Result<()> {
    if stores.wallet.restore().is_none() {
        bail!("No session: run `vearn connect` first");
    }
    Ok(())
}

async fn refresh_all(stores: &Stores) -> Result<()> {
    stores.balance.refresh().await?;
    let (allowance, reserve) = tokio::join!(stores.allowance.refresh(), stores.reserve.refresh());
    allowance?;
    reserve?;
    stores.forecast.refresh().await?;
    Ok(())
}

fn finish_tx(status: &TxStatus, error: Option<String>) -> Result<()> {
    if let Some(error) = error {
        bail!(error);
    }
    match status {
        TxStatus::Mined(receipt) => {
            println!(
                "Transaction {} mined in block {}",
                receipt.meta.tx_id, receipt.meta.block_number
            );
            Ok(())
        }
        other => bail!("Transaction did not complete: {other:?}"),
    }
}

fn vtho(amount: alloy::primitives::U256) -> String {
    truncate(&format_units(amount, TOKEN_DECIMALS), 4)
}

fn print_status(stores: &Stores) {
    let balance = stores.balance.state();
    let allowance = stores.allowance.state();
    let reserve = stores.reserve.state();

    if let Some(account) = balance.account {
        println!("Account:    {account}");
    }
    println!(
        "Balance:    {} VET / {} VTHO",
        vtho(balance.current.vet),
        vtho(balance.current.vtho)
    );
    println!("Allowance:  {}", if allowance.allowed { "granted" } else { "not granted" });
    if reserve.config.is_registered() {
        println!(
            "Config:     trigger {} VTHO, reserve {} VTHO",
            vtho(reserve.config.trigger_balance),
            vtho(reserve.config.reserve_balance)
        );
    } else {
        println!("Config:     not registered");
    }
    for error in [balance.error, allowance.error, reserve.error].into_iter().flatten() {
        println!("Error:      {error}");
    }
    print_forecast(&stores.forecast.state());
}

fn print_forecast(state: &ForecastState) {
    if let Some(error) = &state.error {
        println!("Forecast:   unavailable ({error})");
        return;
    }
    match &state.solution {
        Some(solution) => println!(
            "Forecast:   withdraw {} VTHO in {} step(s), +{} VET",
            vtho(solution.withdraw_amount),
            solution.steps_count,
            vtho(solution.delta_vet)
        ),
        None => println!("Forecast:   no solution"),
    }
    if let Some(trade) = &state.trade {
        println!(
            "Next swap:  {} VTHO -> {} VET (fees {} VTHO)",
            vtho(trade.withdraw_amount),
            vtho(trade.amount_out),
            vtho(trade.total_fees)
        );
    }
    if let Some(seconds) = state.seconds_until_trigger {
        println!("Trigger in: {seconds}s");
    }
}

async fn watch(stores: &Stores, config: &AppConfig) -> Result<()> {
    let cancel = stores.wallet.session_token();
    let polling = stores
        .balance
        .spawn_polling(config.polling.balance_interval, cancel.clone());
    let mut updates = stores.forecast.store().subscribe();

    stores.balance.refresh().await?;
    info!("Watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.fetched {
                    print_forecast(&state);
                }
            }
        }
    }

    cancel.cancel();
    if let Err(e) = polling.await {
        warn!(error = %e, "Balance polling task failed");
    }
    Ok(())
}
