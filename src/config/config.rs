use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - The append-only coin price history
/// - Derived analysis tables (rankings, dominance, changes, volatility)
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Upstream price API configuration.
///
/// Defaults follow the public CoinGecko rate limits: small batches,
/// long pauses between batches and fixed-delay retries.
#[derive(Debug, Deserialize, Clone)]
pub struct CoinGeckoSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Max ids per `/coins/markets` call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between two consecutive market batches
    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: u64,
    #[serde(default = "default_markets_timeout_secs")]
    pub markets_timeout_secs: u64,
    #[serde(default = "default_markets_max_attempts")]
    pub markets_max_attempts: u32,
    #[serde(default = "default_markets_retry_delay_secs")]
    pub markets_retry_delay_secs: u64,
    #[serde(default = "default_chart_timeout_secs")]
    pub chart_timeout_secs: u64,
    #[serde(default = "default_chart_max_attempts")]
    pub chart_max_attempts: u32,
    #[serde(default = "default_chart_retry_delay_secs")]
    pub chart_retry_delay_secs: u64,
    #[serde(default = "default_symbol_timeout_secs")]
    pub symbol_timeout_secs: u64,
    /// Pause between two coins during a historical backfill
    #[serde(default = "default_backfill_pause_secs")]
    pub backfill_pause_secs: u64,
}

fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_pause_secs() -> u64 {
    30
}

fn default_markets_timeout_secs() -> u64 {
    15
}

fn default_markets_max_attempts() -> u32 {
    2
}

fn default_markets_retry_delay_secs() -> u64 {
    3
}

fn default_chart_timeout_secs() -> u64 {
    30
}

fn default_chart_max_attempts() -> u32 {
    3
}

fn default_chart_retry_delay_secs() -> u64 {
    25
}

fn default_symbol_timeout_secs() -> u64 {
    10
}

fn default_backfill_pause_secs() -> u64 {
    25
}

impl Default for CoinGeckoSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            batch_pause_secs: default_batch_pause_secs(),
            markets_timeout_secs: default_markets_timeout_secs(),
            markets_max_attempts: default_markets_max_attempts(),
            markets_retry_delay_secs: default_markets_retry_delay_secs(),
            chart_timeout_secs: default_chart_timeout_secs(),
            chart_max_attempts: default_chart_max_attempts(),
            chart_retry_delay_secs: default_chart_retry_delay_secs(),
            symbol_timeout_secs: default_symbol_timeout_secs(),
            backfill_pause_secs: default_backfill_pause_secs(),
        }
    }
}

/// Tracked coin configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingSettings {
    /// JSON file holding the tracked coin ids
    #[serde(default = "default_coins_file")]
    pub coins_file: String,
    /// Used when the coins file is missing, empty or unreadable
    #[serde(default = "default_coins")]
    pub default_coins: Vec<String>,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: u32,
    /// Startup backfill runs only below this many stored records
    #[serde(default = "default_backfill_threshold")]
    pub backfill_threshold: u64,
}

fn default_coins_file() -> String {
    "coins_to_track.json".to_string()
}

pub const DEFAULT_COINS: &[&str] = &[
    "bitcoin",
    "ethereum",
    "ethereum-classic",
    "ripple",
    "cardano",
    "solana",
    "dogecoin",
    "polkadot",
    "shiba-inu",
    "polygon",
    "litecoin",
    "tron",
    "stellar",
    "vechain",
    "monero",
    "eos",
    "theta",
    "axie-infinity",
    "crypto-com-chain",
    "uniswap",
];

fn default_coins() -> Vec<String> {
    DEFAULT_COINS.iter().map(|s| s.to_string()).collect()
}

fn default_backfill_days() -> u32 {
    90
}

fn default_backfill_threshold() -> u64 {
    100
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            coins_file: default_coins_file(),
            default_coins: default_coins(),
            backfill_days: default_backfill_days(),
            backfill_threshold: default_backfill_threshold(),
        }
    }
}

/// Intervals for the two periodic jobs and the shutdown grace period.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_ingestion_interval")]
    pub ingestion_interval_secs: u64,
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_ingestion_interval() -> u64 {
    60
}

fn default_analysis_interval() -> u64 {
    120
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_auto_start() -> bool {
    true
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            ingestion_interval_secs: default_ingestion_interval(),
            analysis_interval_secs: default_analysis_interval(),
            shutdown_grace_secs: default_shutdown_grace(),
            auto_start: default_auto_start(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalysisSettings {
    /// Only records newer than this many days feed the analyses
    #[serde(default)]
    pub history_days: Option<u32>,
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, then overridden by
/// `COINPULSE__SECTION__KEY` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Without a postgres section the history lives in memory only
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
    #[serde(default)]
    pub coingecko: CoinGeckoSettings,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("COINPULSE").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
