use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{
    AveragePriceRow, DailyPriceChangeRow, DominanceRow, LastPriceRow, PriceRecord, RankingKind,
    RankingRow, StoredPriceRecord, VolumeChangeRow, WeeklyVolatilityRow,
};
use crate::error::Result;

/// Append-only log of price observations.
///
/// Shared by ingestion (writes) and analysis (reads). Implementations must
/// tolerate concurrent callers; nothing here spans a transaction across
/// calls.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Appends records, returning how many were written.
    async fn insert_many(&self, records: &[PriceRecord]) -> Result<usize>;

    async fn count(&self) -> Result<u64>;

    /// Latest record for a coin by timestamp (lowest id on ties).
    async fn find_latest(&self, coin_id: &str) -> Result<Option<StoredPriceRecord>>;

    async fn distinct_coin_ids(&self) -> Result<Vec<String>>;

    /// Full history, optionally restricted to records at or after `since`.
    async fn load_history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredPriceRecord>>;
}

/// Destination tables for the analysis jobs.
///
/// Rankings replace the table contents; every other dataset is appended
/// and keeps the rows of past runs.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn replace_ranking(&self, kind: RankingKind, rows: &[RankingRow]) -> Result<()>;

    async fn append_dominance(&self, rows: &[DominanceRow]) -> Result<()>;

    async fn append_volume_changes(&self, rows: &[VolumeChangeRow]) -> Result<()>;

    async fn append_average_prices(&self, rows: &[AveragePriceRow]) -> Result<()>;

    async fn append_last_prices(&self, rows: &[LastPriceRow]) -> Result<()>;

    async fn append_daily_price_changes(&self, rows: &[DailyPriceChangeRow]) -> Result<()>;

    async fn append_weekly_volatility(&self, rows: &[WeeklyVolatilityRow]) -> Result<()>;
}
