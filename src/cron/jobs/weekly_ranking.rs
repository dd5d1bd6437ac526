//! Job to rank coins per week by market cap or trading volume.
//!
//! Reduces the history to the latest record per (coin, week), then assigns
//! row-number ranks within each week. The ranking tables are replaced on
//! every run.

use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;
use rustc_hash::FxHashMap;

use crate::db::models::{RankingKind, RankingRow, StoredPriceRecord};
use crate::db::AnalyticsSink;
use crate::utils::{latest_per_key, sum_present, week_start};

struct WeeklyEntry<'a> {
    coin_id: &'a str,
    symbol: &'a str,
    value: Option<f64>,
}

fn measure(kind: RankingKind, record: &StoredPriceRecord) -> Option<f64> {
    match kind {
        RankingKind::MarketCap => record.record.market_cap,
        RankingKind::Volume => record.record.volume,
    }
}

/// Larger values first, missing values last, then coin id ascending so
/// equal values still get distinct, reproducible ranks.
fn rank_order(a: &WeeklyEntry, b: &WeeklyEntry) -> Ordering {
    let by_value = match (a.value, b.value) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_value.then_with(|| a.coin_id.cmp(b.coin_id))
}

pub fn compute(
    history: &[StoredPriceRecord],
    kind: RankingKind,
    analysis_timestamp: DateTime<Utc>,
) -> Vec<RankingRow> {
    let latest = latest_per_key(history, |r| {
        (r.record.coin_id.clone(), week_start(r.record.timestamp))
    });

    let mut weeks: FxHashMap<DateTime<Utc>, Vec<WeeklyEntry>> = FxHashMap::default();
    for ((_, week), record) in &latest {
        weeks.entry(*week).or_default().push(WeeklyEntry {
            coin_id: &record.record.coin_id,
            symbol: &record.record.symbol,
            value: sum_present([measure(kind, record)]),
        });
    }

    let mut week_keys: Vec<DateTime<Utc>> = weeks.keys().copied().collect();
    week_keys.sort();

    let mut rows = Vec::with_capacity(latest.len());
    for week in week_keys {
        let Some(mut entries) = weeks.remove(&week) else {
            continue;
        };
        entries.sort_by(rank_order);

        for (position, entry) in entries.iter().enumerate() {
            rows.push(RankingRow {
                coin_id: entry.coin_id.to_string(),
                symbol: entry.symbol.to_string(),
                week_start: week,
                weekly_value: entry.value,
                rank_position: position as i32 + 1,
                analysis_timestamp,
            });
        }
    }

    rows
}

pub async fn run(
    history: &[StoredPriceRecord],
    sink: &dyn AnalyticsSink,
    kind: RankingKind,
    analysis_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let start = std::time::Instant::now();

    let rows = compute(history, kind, analysis_timestamp);
    sink.replace_ranking(kind, &rows).await?;

    info!(
        "Replaced {} with {} rows in {:?}",
        kind.table(),
        rows.len(),
        start.elapsed()
    );
    Ok(rows.len())
}
