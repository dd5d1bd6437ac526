use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Which weekly ranking table a set of rows belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingKind {
    MarketCap,
    Volume,
}

impl RankingKind {
    pub fn table(&self) -> &'static str {
        match self {
            RankingKind::MarketCap => "marketcap_weekly_ranking",
            RankingKind::Volume => "volume_weekly_ranking",
        }
    }
}

/// Weekly rank of a coin by market cap or volume.
///
/// Overwritten wholesale on every analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub coin_id: String,
    pub symbol: String,
    pub week_start: DateTime<Utc>,
    /// Summed measure, `None` when the coin reported no value that week
    pub weekly_value: Option<f64>,
    pub rank_position: i32,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Share of the tracked market cap held by one coin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DominanceRow {
    pub coin_id: String,
    pub symbol: String,
    pub market_cap: f64,
    pub market_dominance_pct: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Day-over-day change of summed trading volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeChangeRow {
    pub coin_id: String,
    pub symbol: String,
    pub date: NaiveDate,
    pub daily_volume: f64,
    pub volume_change_pct: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Whole-history price statistics per symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragePriceRow {
    pub symbol: String,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub record_count: i64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Most recent price seen for a coin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastPriceRow {
    pub coin_id: String,
    pub symbol: String,
    pub price: f64,
    pub last_collected: DateTime<Utc>,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Day-over-day change of the daily average price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPriceChangeRow {
    pub coin_id: String,
    pub symbol: String,
    pub date: NaiveDate,
    pub start_price: f64,
    pub end_price: f64,
    pub price_change_pct: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Price dispersion of a coin within one week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyVolatilityRow {
    pub coin_id: String,
    pub symbol: String,
    pub week: DateTime<Utc>,
    pub price_range: f64,
    pub volatility_pct: f64,
    pub record_count: i64,
    pub analysis_timestamp: DateTime<Utc>,
}
