use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use brokersign::bot::Bot;
use brokersign::broker::BrokerClient;
use brokersign::config::{self, Settings};
use brokersign::risk::RiskManager;
use brokersign::strategy::EmaCrossover;
use brokersign::{RequestParams, RequestSigner};

#[derive(Parser, Debug)]
#[command(author, version, about = "OAuth 1.0a signed brokerage trading bot")]
struct Cli {
    /// Settings file; defaults to config/brokersign.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the trading loop until Ctrl-C.
    Run,

    /// Prints the Authorization header for one request.
    Sign {
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Endpoint URL without query string.
        #[arg(short, long)]
        url: String,

        /// Additional signed parameter, `key=value`. Repeatable.
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Prints the last traded price of a symbol.
    Quote { symbol: String },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load_settings_from(cli.config.as_deref()).context("loading settings")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let credentials = settings.credentials.to_credentials();
    if credentials.is_incomplete() {
        tracing::warn!("credentials are incomplete; the brokerage will reject signed requests");
    }
    let signer = RequestSigner::new(credentials);

    match cli.command {
        Commands::Run => run(settings, signer).await?,
        Commands::Sign { method, url, params } => {
            let params: RequestParams = params.into_iter().collect();
            let header = signer.sign(&method, &url, &params)?;
            println!("Authorization: {}", header);
        }
        Commands::Quote { symbol } => {
            let client = BrokerClient::new(&settings.broker, signer)?;
            let price = client.get_quote(&symbol).await?;
            println!("{} {}", symbol, price);
        }
    }
    Ok(())
}

async fn run(settings: Settings, signer: RequestSigner) -> Result<()> {
    tracing::info!("Starting brokerage trading bot");

    let client = BrokerClient::new(&settings.broker, signer)?
        .with_history_window(settings.bot.lookback_days, settings.bot.interval.as_str());
    let strategy = EmaCrossover::from_settings(&settings.strategy)?;
    let risk = RiskManager::new(&settings.risk)?;
    let mut bot = Bot::new(strategy, risk, client.clone(), client, settings.bot.clone());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received.");
                flag.store(true, Ordering::SeqCst);
            }
            Err(e) => tracing::error!(error = %e, "unable to listen for the shutdown signal"),
        }
    });

    let summary = bot.run(shutdown).await;
    tracing::info!(
        iterations = summary.iterations,
        orders = summary.orders_placed,
        "All done. Exiting."
    );
    Ok(())
}
