pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use cron::{AnalysisEngine, AnalysisReport, CronScheduler};
pub use db::Database;
pub use error::CoinPulseError;
pub use worker::{CoinGeckoApi, IngestionClient, IngestionService, PriceApi};
