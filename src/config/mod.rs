#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    AnalysisSettings, CoinGeckoSettings, PostgresSettings, SchedulerSettings, Settings,
    TrackingSettings, DEFAULT_COINS,
};
