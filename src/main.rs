//! Zerodha → 5paisa copy-trader
//!
//! Polls the Kite order book and mirrors every order that completes after
//! startup onto an XTS account, once, scaled by a quantity multiplier.

mod api;
mod audit;
mod bot;
mod db;
mod error;
mod models;
mod trading;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{acquire_session, KiteClient, SessionToken, StaticSession, XtsClient};
use crate::audit::FileAuditLog;
use crate::bot::Bot;
use crate::db::MappingStore;
use crate::models::{ProductType, TimeInForce};
use crate::trading::{parse_option_symbol, CopierConfig, InstrumentResolver};

/// How long startup keeps retrying session acquisition.
const SESSION_RETRY_WINDOW: Duration = Duration::from_secs(60);

/// Zerodha → 5paisa copy-trader CLI.
#[derive(Parser)]
#[command(name = "zcopier")]
#[command(about = "Mirror completed Zerodha orders onto a 5paisa XTS account", long_about = None)]
struct Cli {
    /// Mapping database URL
    #[arg(short, long, env = "COPIER_DATABASE", default_value = "sqlite:./copy_map.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Order audit log file
    #[arg(long, env = "COPIER_AUDIT_LOG", default_value = "Orderlog.txt")]
    audit_log: String,

    #[command(subcommand)]
    command: Commands,
}

/// Brokerage endpoints and pre-issued session tokens.
#[derive(Args)]
struct Credentials {
    #[arg(long, env = "KITE_API_KEY")]
    kite_api_key: Option<String>,

    #[arg(long, env = "KITE_ACCESS_TOKEN", hide_env_values = true)]
    kite_access_token: Option<String>,

    #[arg(long, env = "KITE_BASE_URL", default_value = "https://api.kite.trade")]
    kite_base_url: String,

    #[arg(long, env = "XTS_INTERACTIVE_TOKEN", hide_env_values = true)]
    xts_interactive_token: Option<String>,

    #[arg(long, env = "XTS_MARKETDATA_TOKEN", hide_env_values = true)]
    xts_marketdata_token: Option<String>,

    #[arg(long, env = "XTS_BASE_URL", default_value = "https://xtsapi.5paisa.com")]
    xts_base_url: String,
}

impl Credentials {
    async fn xts_client(&self, timeout: Duration) -> Result<XtsClient> {
        let interactive = acquire(
            "xts-interactive",
            self.xts_interactive_token.clone(),
        )
        .await?;
        let marketdata = acquire("xts-marketdata", self.xts_marketdata_token.clone()).await?;

        XtsClient::with_base_url(self.xts_base_url.clone(), interactive, marketdata, timeout)
            .context("Failed to create XTS client")
    }

    async fn kite_client(&self, timeout: Duration) -> Result<KiteClient> {
        let api_key = self
            .kite_api_key
            .as_deref()
            .context("KITE_API_KEY is not set")?;
        let token = acquire("kite", self.kite_access_token.clone()).await?;

        KiteClient::with_base_url(self.kite_base_url.clone(), api_key, token, timeout)
            .context("Failed to create Kite client")
    }
}

async fn acquire(name: &str, token: Option<String>) -> Result<SessionToken> {
    let provider = StaticSession::new(name, token);
    acquire_session(&provider, SESSION_RETRY_WINDOW)
        .await
        .with_context(|| format!("Failed to establish {} session", name))
}

#[derive(Subcommand)]
enum Commands {
    /// Start the copier loop
    Run {
        /// Polling interval in seconds
        #[arg(short, long, env = "COPIER_POLL_INTERVAL_SECS", default_value = "2")]
        interval_secs: u64,

        /// Destination quantity multiplier (non-positive → 1)
        #[arg(short, long, env = "COPY_TRADE_QTY_MULTIPLIER", allow_negative_numbers = true)]
        multiplier: Option<i64>,

        /// Timeout for each brokerage call in seconds
        #[arg(short, long, env = "COPIER_REQUEST_TIMEOUT_SECS", default_value = "5")]
        timeout_secs: u64,

        /// Destination product type (MIS, NRML, CNC)
        #[arg(long, env = "COPIER_PRODUCT_TYPE", default_value = "MIS")]
        product: ProductType,

        /// Destination time-in-force (DAY, IOC)
        #[arg(long, env = "COPIER_TIME_IN_FORCE", default_value = "DAY")]
        tif: TimeInForce,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Decode a Kite option symbol (and optionally look it up on XTS)
    Resolve {
        /// Trading symbol, e.g. NIFTY25N0425800PE
        symbol: String,

        /// Also query the destination symbol directory
        #[arg(long)]
        lookup: bool,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// List recorded source → destination mappings
    Mappings {
        /// Show only the most recent N
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the default configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            interval_secs,
            multiplier,
            timeout_secs,
            product,
            tif,
            credentials,
        } => {
            let config = CopierConfig {
                poll_interval_secs: interval_secs,
                request_timeout_secs: timeout_secs,
                product_type: product,
                time_in_force: tif,
                ..CopierConfig::default()
            }
            .with_multiplier(multiplier);

            info!(
                interval = interval_secs,
                multiplier = config.quantity_multiplier,
                "Starting copier"
            );

            let kite = Arc::new(credentials.kite_client(config.request_timeout()).await?);
            let xts = Arc::new(credentials.xts_client(config.request_timeout()).await?);

            let store = MappingStore::open(&cli.database)
                .await
                .with_context(|| format!("Failed to open mapping store {}", cli.database))?;
            let audit = Arc::new(FileAuditLog::new(&cli.audit_log));

            println!("\n=== Zerodha → 5paisa Copier ===");
            println!("Polling interval:  {}s", config.poll_interval().as_secs());
            println!("Multiplier:        {}", config.quantity_multiplier);
            println!("Product / TIF:     {} / {}", config.product_type, config.time_in_force);
            println!("Known mappings:    {}", store.len());
            println!("Audit log:         {}", audit.path().display());
            println!("\nOrders already on the book will NOT be copied.");
            println!("Press Ctrl+C to stop.\n");

            let bot = Bot::new(config, kite, xts.clone(), xts, store, audit);
            let stats = bot.run().await?;

            println!("\n{}", stats);
        }

        Commands::Resolve {
            symbol,
            lookup,
            credentials,
        } => {
            let parsed = parse_option_symbol(&symbol)?;

            println!("\n=== {} ===", symbol.to_uppercase());
            println!("Series:      {}", parsed.series.as_str());
            println!("Underlying:  {}", parsed.underlying);
            println!(
                "Expiry:      {}{}",
                parsed.expiry_api_format(),
                if parsed.is_monthly() { " (monthly, day resolved on lookup)" } else { "" }
            );
            println!("Option type: {}", parsed.option_type.as_str());
            println!("Strike:      {}", parsed.strike);
            println!("Exchange:    {}", parsed.exchange.as_str());

            if lookup {
                let timeout = CopierConfig::default().request_timeout();
                let xts = Arc::new(credentials.xts_client(timeout).await?);
                let resolver = InstrumentResolver::new(xts, timeout);

                let (_, instrument) = resolver.resolve(&symbol).await?;
                println!(
                    "Destination: {} instrument {}",
                    instrument.exchange_segment, instrument.instrument_id
                );
            }
        }

        Commands::Mappings { limit } => {
            let store = MappingStore::open(&cli.database)
                .await
                .with_context(|| format!("Failed to open mapping store {}", cli.database))?;
            if store.is_empty() {
                println!("No mappings recorded yet.");
                store.close().await;
                return Ok(());
            }

            let entries = store.entries().await?;

            let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));

            println!(
                "\n{:<20} {:<16} {:<24} {:<5} {:>8} {:>8}  {}",
                "SOURCE", "DESTINATION", "SYMBOL", "SIDE", "SRC QTY", "DST QTY", "CREATED"
            );
            println!("{}", "-".repeat(112));

            for entry in entries.iter().skip(skip) {
                println!(
                    "{:<20} {:<16} {:<24} {:<5} {:>8} {:>8}  {}",
                    truncate(&entry.source_order_id, 20),
                    truncate(&entry.destination_order_id, 16),
                    truncate(&entry.symbol, 24),
                    entry.side,
                    entry.source_quantity,
                    entry.destination_quantity,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("\n{} mapping(s) on file", entries.len());

            store.close().await;
        }

        Commands::Config => {
            let config = CopierConfig::default();

            println!("\n=== Copier Configuration ===\n");
            println!("Loop:");
            println!("  Poll Interval:        {}s", config.poll_interval_secs);
            println!("  Request Timeout:      {}s", config.request_timeout_secs);

            println!("\nMirrored Orders:");
            println!("  Quantity Multiplier:  {}", config.quantity_multiplier);
            println!("  Order Type:           MARKET");
            println!("  Product Type:         {}", config.product_type);
            println!("  Time In Force:        {}", config.time_in_force);
            println!("  Order Tag:            {}-<source order id>", config.order_tag_prefix);

            println!("\nStorage:");
            println!("  Database:             {}", cli.database);
            println!("  Audit Log:            {}", cli.audit_log);

            println!("\nEnvironment:");
            println!("  COPIER_POLL_INTERVAL_SECS, COPY_TRADE_QTY_MULTIPLIER,");
            println!("  KITE_API_KEY, KITE_ACCESS_TOKEN,");
            println!("  XTS_INTERACTIVE_TOKEN, XTS_MARKETDATA_TOKEN");
        }
    }

    Ok(())
}

/// Truncate string for display.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
