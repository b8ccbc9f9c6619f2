//! Layered settings: built-in defaults, an optional TOML file, then
//! `BROKERSIGN_*` environment variables (`__` separates nesting levels).

use chrono::NaiveTime;
use config::{Config, Environment, File, Map};
use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::credentials::Credentials;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config/brokersign";
pub const ENV_PREFIX: &str = "BROKERSIGN";

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub credentials: CredentialSettings,
    pub broker: BrokerSettings,
    pub strategy: StrategySettings,
    pub risk: RiskSettings,
    pub bot: BotSettings,
}

/// Raw credential values as they come out of the config sources.
#[derive(Deserialize, Clone, Default)]
pub struct CredentialSettings {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl CredentialSettings {
    pub fn to_credentials(&self) -> Credentials {
        Credentials::new(
            self.consumer_key.clone(),
            self.consumer_secret.clone(),
            self.access_token.clone(),
            self.access_token_secret.clone(),
        )
    }
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct BrokerSettings {
    /// Market data API base, e.g. `https://api.etrade.com/v1/market`.
    pub market_url: String,
    /// Accounts API base, e.g. `https://api.etrade.com/v1/accounts`.
    pub accounts_url: String,
    pub account_id: String,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub fast_period: usize,
    pub slow_period: usize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RiskSettings {
    pub max_position_size: u32,
    /// A list in TOML, or comma separated from the environment.
    #[serde(deserialize_with = "symbol_list")]
    pub allowed_symbols: Vec<String>,
    /// Local wall-clock time, `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff`.
    pub market_open: String,
    /// Local wall-clock time, `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff`.
    pub market_close: String,
}

impl RiskSettings {
    /// Parsed `(open, close)` window.
    pub fn market_window(&self) -> Result<(NaiveTime, NaiveTime)> {
        let open = parse_hhmm(&self.market_open)?;
        let close = parse_hhmm(&self.market_close)?;
        if open >= close {
            return Err(Error::InvalidConfig(format!(
                "market_open ({}) must be before market_close ({})",
                self.market_open, self.market_close
            )));
        }
        Ok((open, close))
    }
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            max_position_size: 100,
            allowed_symbols: vec!["AAPL".into(), "MSFT".into(), "TSLA".into()],
            market_open: "09:30".into(),
            market_close: "16:00".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub symbol: String,
    pub order_size: u32,
    pub lookback_days: u32,
    /// `daily`, `weekly` or `monthly`.
    pub interval: String,
    pub poll_interval_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        BotSettings {
            symbol: "AAPL".into(),
            order_size: 1,
            lookback_days: 60,
            interval: "daily".into(),
            poll_interval_ms: 1000,
            retry_delay_ms: 2000,
        }
    }
}

fn symbol_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Symbols {
        List(Vec<String>),
        Csv(String),
    }

    let symbols = match Symbols::deserialize(deserializer)? {
        Symbols::List(list) => list,
        Symbols::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(symbols
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
        .map_err(|e| Error::InvalidConfig(format!("{:?} is not a HH:MM time: {}", value, e)))
}

/// Loads settings from `config/brokersign.toml` (if present) and the environment.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(None)
}

/// Loads settings with an explicit config file; the file must exist when given.
pub fn load_settings_from(path: Option<&Path>) -> Result<Settings> {
    // Load .env file if present (ignores errors if file doesn't exist)
    dotenvy::dotenv().ok();
    load_layers(path, None)
}

/// `env` replaces the process environment when given.
fn load_layers(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Settings> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    // No try_parsing: secrets and account ids must stay strings. Numeric
    // fields are converted from strings during deserialization.
    let builder = with_defaults(Config::builder())?
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("risk.allowed_symbols")
                .source(env),
        );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    let risk = RiskSettings::default();
    let bot = BotSettings::default();
    Ok(builder
        .set_default("log_level", "info")?
        .set_default("credentials.consumer_key", "")?
        .set_default("credentials.consumer_secret", "")?
        .set_default("credentials.access_token", "")?
        .set_default("credentials.access_token_secret", "")?
        .set_default("broker.market_url", "https://api.etrade.com/v1/market")?
        .set_default("broker.accounts_url", "https://api.etrade.com/v1/accounts")?
        .set_default("broker.account_id", "")?
        .set_default("broker.request_timeout_secs", 10)?
        .set_default("strategy.fast_period", 12)?
        .set_default("strategy.slow_period", 26)?
        .set_default("risk.max_position_size", risk.max_position_size)?
        .set_default("risk.allowed_symbols", risk.allowed_symbols)?
        .set_default("risk.market_open", risk.market_open)?
        .set_default("risk.market_close", risk.market_close)?
        .set_default("bot.symbol", bot.symbol)?
        .set_default("bot.order_size", bot.order_size)?
        .set_default("bot.lookback_days", bot.lookback_days)?
        .set_default("bot.interval", bot.interval)?
        .set_default("bot.poll_interval_ms", bot.poll_interval_ms)?
        .set_default("bot.retry_delay_ms", bot.retry_delay_ms)?)
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.fast_period == 0 || s.fast_period >= s.slow_period {
            return Err(Error::InvalidConfig(format!(
                "strategy periods must satisfy 0 < fast ({}) < slow ({})",
                s.fast_period, s.slow_period
            )));
        }
        self.risk.market_window()?;
        if !matches!(self.bot.interval.as_str(), "daily" | "weekly" | "monthly") {
            return Err(Error::InvalidConfig(format!(
                "bot.interval must be daily, weekly or monthly, got {:?}",
                self.bot.interval
            )));
        }
        if self.bot.symbol.is_empty() {
            return Err(Error::InvalidConfig("bot.symbol must not be empty".into()));
        }
        Ok(())
    }
}
