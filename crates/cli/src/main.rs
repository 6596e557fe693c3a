use anyhow::{Context, Result};
use arb_engine_core::broadcaster::NullBroadcaster;
use arb_engine_core::config::EngineConfig;
use arb_engine_core::config_loader::ConfigLoader;
use arb_engine_core::model::{PairConfig, PairStatus};
use arb_engine_engine::{EngineContext, EngineSupervisor};
use arb_engine_executor::OrderExecutor;
use arb_engine_notifications::NotificationRouter;
use arb_engine_pairs::PairRegistry;
use arb_engine_persistence_mem::{InMemoryNotificationRepository, InMemorySettingsRepository, InMemoryTradeRepository};
use arb_engine_price_tracker::PriceTracker;
use arb_engine_registry::ExchangeRegistry;
use arb_engine_stats::StatsAggregator;
use arb_engine_vault::CredentialVault;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "arb-engine")]
#[command(about = "Cross-venue perpetual-futures arbitrage engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the engine and run until interrupted
    Run {
        /// Config profile overlay, e.g. "production" for config/Config.production.toml
        #[arg(long)]
        profile: Option<String>,
        /// Exchange credential to connect at boot, repeatable:
        /// `venue:api_key:secret[:passphrase]`
        #[arg(long = "exchange")]
        exchanges: Vec<String>,
        /// JSON file holding a `Vec<PairConfig>` to seed on boot
        #[arg(long)]
        pairs_file: Option<String>,
    },
    /// One-shot venue connectivity check: connects, prints the balance, disconnects
    TestConnection {
        #[arg(long)]
        venue: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        secret: String,
        #[arg(long)]
        passphrase: Option<String>,
        /// Config profile overlay, e.g. "production" for config/Config.production.toml
        #[arg(long)]
        profile: Option<String>,
    },
    /// Validates a pair config JSON file against the invariants a live create would enforce
    ValidatePair {
        /// Path to a JSON-encoded `PairConfig`
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            exchanges,
            pairs_file,
        } => run_engine(profile.as_deref(), &exchanges, pairs_file.as_deref()).await,
        Commands::TestConnection {
            venue,
            api_key,
            secret,
            passphrase,
            profile,
        } => test_connection(profile.as_deref(), &venue, &api_key, &secret, passphrase.as_deref()).await,
        Commands::ValidatePair { file } => validate_pair(&file),
    }
}

fn load_vault(config: &EngineConfig) -> Result<CredentialVault> {
    let raw = std::env::var(&config.vault.secret_env)
        .with_context(|| format!("environment variable {} is not set", config.vault.secret_env))?;
    let secret = SecretString::from(raw);
    CredentialVault::from_encoded_secret(&secret).context("failed to build credential vault from the configured secret")
}

/// Parses a `venue:api_key:secret[:passphrase]` credential spec.
fn parse_exchange_spec(spec: &str) -> Result<(String, String, String, Option<String>)> {
    let parts: Vec<&str> = spec.splitn(4, ':').collect();
    match parts.as_slice() {
        [venue, api_key, secret] => Ok((venue.to_string(), api_key.to_string(), secret.to_string(), None)),
        [venue, api_key, secret, passphrase] => Ok((
            venue.to_string(),
            api_key.to_string(),
            secret.to_string(),
            Some(passphrase.to_string()),
        )),
        _ => anyhow::bail!("malformed --exchange spec {spec:?}, expected venue:api_key:secret[:passphrase]"),
    }
}

fn load_config(profile: Option<&str>) -> Result<EngineConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(profile).with_context(|| format!("failed to load configuration for profile {profile}")),
        None => ConfigLoader::load().context("failed to load configuration"),
    }
}

async fn run_engine(profile: Option<&str>, exchanges: &[String], pairs_file: Option<&str>) -> Result<()> {
    let config = load_config(profile)?;
    let vault = load_vault(&config)?;

    let registry = Arc::new(ExchangeRegistry::new(vault, config.venue.http_timeout));
    for spec in exchanges {
        let (venue, api_key, secret, passphrase) = parse_exchange_spec(spec)?;
        registry
            .connect_exchange(&venue, &api_key, &secret, passphrase.as_deref())
            .await
            .with_context(|| format!("failed to connect to {venue}"))?;
        tracing::info!(venue = %venue, "connected exchange");
    }

    let pairs = Arc::new(PairRegistry::new(Arc::clone(&registry)));
    if let Some(path) = pairs_file {
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read pairs file {path}"))?;
        let seeded: Vec<PairConfig> = serde_json::from_str(&raw).context("pairs file is not a valid PairConfig array")?;
        for mut config in seeded {
            let should_start = config.status == PairStatus::Active;
            config.status = PairStatus::Paused;
            let created = pairs.create(config).await.context("failed to seed a pair from the pairs file")?;
            if should_start {
                pairs.start(created.id).await.context("failed to start a seeded pair")?;
            }
        }
    }

    let price_tracker = Arc::new(PriceTracker::new());
    let executor = Arc::new(OrderExecutor::new(Arc::clone(&registry)));
    let broadcaster = Arc::new(NullBroadcaster);

    let notifications_repo = Arc::new(InMemoryNotificationRepository::new());
    let settings_repo = Arc::new(InMemorySettingsRepository::new());
    let trades_repo = Arc::new(InMemoryTradeRepository::new());

    let notifications = Arc::new(NotificationRouter::new(
        notifications_repo,
        settings_repo,
        Arc::clone(&broadcaster) as Arc<dyn arb_engine_core::broadcaster::Broadcaster>,
    ));

    // `StatsAggregator` rolls a pair's trade count/pnl through `PairRepository`;
    // `PairRegistry` keeps its own in-memory pairs and doesn't implement that
    // trait, so stats get an unused-but-real in-memory store of their own.
    let stats_pairs_repo: Arc<dyn arb_engine_core::repository::PairRepository> =
        Arc::new(arb_engine_persistence_mem::InMemoryPairRepository::new());
    let stats = Arc::new(StatsAggregator::new(
        trades_repo,
        stats_pairs_repo,
        Arc::clone(&broadcaster) as Arc<dyn arb_engine_core::broadcaster::Broadcaster>,
    ));

    let ctx = Arc::new(EngineContext {
        registry: Arc::clone(&registry),
        price_tracker,
        executor,
        notifications,
        stats,
        pairs: Arc::clone(&pairs),
        tick_interval: config.pairs.tick_interval,
        stale_tick_threshold: chrono::Duration::from_std(config.risk.stale_tick_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(5)),
        safety_margin: Decimal::from_str(&config.risk.safety_margin.to_string()).unwrap_or(Decimal::new(10, 2)),
        shutdown_grace: Duration::from_secs(5),
        max_concurrent_trades: RwLock::new(config.pairs.max_concurrent_trades.map(|v| v as u32)),
        runtimes: RwLock::new(HashMap::<Uuid, _>::new()),
    });

    let supervisor = EngineSupervisor::new(ctx);
    supervisor.start().await;
    tracing::info!("engine running, connected venues = {}", registry.connected_count().await);

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    supervisor.shutdown().await;
    registry.close().await;
    Ok(())
}

async fn test_connection(profile: Option<&str>, venue: &str, api_key: &str, secret: &str, passphrase: Option<&str>) -> Result<()> {
    let config = load_config(profile)?;
    let vault = load_vault(&config)?;
    let registry = ExchangeRegistry::new(vault, config.venue.http_timeout);

    registry.connect_exchange(venue, api_key, secret, passphrase).await?;
    let accounts = registry.list_accounts().await;
    let account = accounts.into_iter().find(|a| a.name == venue);
    match account {
        Some(account) => println!("{venue}: connected, balance = {} USDT", account.balance_usdt),
        None => println!("{venue}: connected, balance unavailable"),
    }
    registry.disconnect_exchange(venue).await?;
    Ok(())
}

fn validate_pair(file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("failed to read {file}"))?;
    let config: PairConfig = serde_json::from_str(&raw).context("file is not a valid PairConfig")?;
    match config.validate() {
        Ok(()) => {
            println!("{}: OK", config.symbol);
            Ok(())
        }
        Err(err) => {
            println!("{}: {err}", config.symbol);
            anyhow::bail!("validation failed")
        }
    }
}
