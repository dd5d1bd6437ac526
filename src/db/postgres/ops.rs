use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use log::error;
use postgres_types::ToSql;
use tokio_postgres::Row;

use crate::db::models::{
    AveragePriceRow, DailyPriceChangeRow, DominanceRow, LastPriceRow, PriceRecord, RankingKind,
    RankingRow, StoredPriceRecord, VolumeChangeRow, WeeklyVolatilityRow,
};
use crate::db::postgres::PostgresClient;
use crate::db::store::{AnalyticsSink, PriceStore};
use crate::error::Result;

type SqlParam<'a> = &'a (dyn ToSql + Sync);

/// Rows per multi-row INSERT; keeps the bind count far below the
/// 65535 parameter limit for every table here.
const INSERT_BATCH_SIZE: usize = 1_000;

const PRICE_COLUMNS: &str = "id, coin_id, symbol, price, volume, market_cap, timestamp";

fn row_to_stored_record(row: &Row) -> StoredPriceRecord {
    StoredPriceRecord::new(
        row.get("id"),
        PriceRecord::new(
            row.get("coin_id"),
            row.get("symbol"),
            row.get("price"),
            row.get("volume"),
            row.get("market_cap"),
            row.get("timestamp"),
        ),
    )
}

/// Multi-row `INSERT INTO table (columns) VALUES (...), (...)` in chunks.
///
/// `bind` pushes exactly `columns.len()` parameters for one item.
async fn insert_chunked<'a, T, F>(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[&str],
    items: &'a [T],
    bind: F,
) -> Result<u64>
where
    T: Sync,
    F: Fn(&'a T, &mut Vec<SqlParam<'a>>) + Send + Sync,
{
    let mut inserted = 0;
    let cols_per_row = columns.len();

    for chunk in items.chunks(INSERT_BATCH_SIZE) {
        let mut params: Vec<SqlParam<'a>> = Vec::with_capacity(chunk.len() * cols_per_row);
        let values_clauses: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, item)| {
                bind(item, &mut params);
                let start = i * cols_per_row + 1;
                let placeholders: Vec<String> = (start..start + cols_per_row)
                    .map(|n| format!("${}", n))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();

        let query = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            values_clauses.join(", ")
        );

        inserted += tx.execute(query.as_str(), &params).await.map_err(|e| {
            error!("Failed to insert {} rows into {}: {:?}", chunk.len(), table, e);
            e
        })?;
    }

    Ok(inserted)
}

#[async_trait]
impl PriceStore for PostgresClient {
    async fn insert_many(&self, records: &[PriceRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let inserted = insert_chunked(
            &tx,
            "coin_price_history",
            &["coin_id", "symbol", "price", "volume", "market_cap", "timestamp"],
            records,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.price);
                p.push(&r.volume);
                p.push(&r.market_cap);
                p.push(&r.timestamp);
            },
        )
        .await?;
        tx.commit().await?;

        Ok(inserted as usize)
    }

    async fn count(&self) -> Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM coin_price_history", &[])
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn find_latest(&self, coin_id: &str) -> Result<Option<StoredPriceRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM coin_price_history
             WHERE coin_id = $1
             ORDER BY timestamp DESC, id ASC
             LIMIT 1",
            PRICE_COLUMNS
        );
        let row = client.query_opt(query.as_str(), &[&coin_id]).await?;
        Ok(row.as_ref().map(row_to_stored_record))
    }

    async fn distinct_coin_ids(&self) -> Result<Vec<String>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT DISTINCT coin_id FROM coin_price_history ORDER BY coin_id",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("coin_id")).collect())
    }

    async fn load_history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredPriceRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM coin_price_history
             WHERE $1::timestamptz IS NULL OR timestamp >= $1
             ORDER BY id",
            PRICE_COLUMNS
        );
        let rows = client.query(query.as_str(), &[&since]).await?;
        Ok(rows.iter().map(row_to_stored_record).collect())
    }
}

#[async_trait]
impl AnalyticsSink for PostgresClient {
    async fn replace_ranking(&self, kind: RankingKind, rows: &[RankingRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(format!("DELETE FROM {}", kind.table()).as_str(), &[])
            .await?;
        insert_chunked(
            &tx,
            kind.table(),
            &[
                "coin_id",
                "symbol",
                "week_start",
                "weekly_value",
                "rank_position",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.week_start);
                p.push(&r.weekly_value);
                p.push(&r.rank_position);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_dominance(&self, rows: &[DominanceRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "market_dominance_history",
            &[
                "coin_id",
                "symbol",
                "market_cap",
                "market_dominance_pct",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.market_cap);
                p.push(&r.market_dominance_pct);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_volume_changes(&self, rows: &[VolumeChangeRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "volume_analysis_history",
            &[
                "coin_id",
                "symbol",
                "date",
                "daily_volume",
                "volume_change_pct",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.date);
                p.push(&r.daily_volume);
                p.push(&r.volume_change_pct);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_average_prices(&self, rows: &[AveragePriceRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "avg_price_history",
            &[
                "symbol",
                "avg_price",
                "min_price",
                "max_price",
                "record_count",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.symbol);
                p.push(&r.avg_price);
                p.push(&r.min_price);
                p.push(&r.max_price);
                p.push(&r.record_count);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_last_prices(&self, rows: &[LastPriceRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "last_price_history",
            &[
                "coin_id",
                "symbol",
                "price",
                "last_collected",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.price);
                p.push(&r.last_collected);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_daily_price_changes(&self, rows: &[DailyPriceChangeRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "daily_change_history",
            &[
                "coin_id",
                "symbol",
                "date",
                "start_price",
                "end_price",
                "price_change_pct",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.date);
                p.push(&r.start_price);
                p.push(&r.end_price);
                p.push(&r.price_change_pct);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_weekly_volatility(&self, rows: &[WeeklyVolatilityRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        insert_chunked(
            &tx,
            "weekly_volatility_history",
            &[
                "coin_id",
                "symbol",
                "week",
                "price_range",
                "volatility_pct",
                "record_count",
                "analysis_timestamp",
            ],
            rows,
            |r, p| {
                p.push(&r.coin_id);
                p.push(&r.symbol);
                p.push(&r.week);
                p.push(&r.price_range);
                p.push(&r.volatility_pct);
                p.push(&r.record_count);
                p.push(&r.analysis_timestamp);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
