//! Job to snapshot the most recent price per coin and symbol.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::db::models::{LastPriceRow, StoredPriceRecord};
use crate::db::AnalyticsSink;
use crate::utils::latest_per_key;

pub fn compute(history: &[StoredPriceRecord], analysis_timestamp: DateTime<Utc>) -> Vec<LastPriceRow> {
    let latest = latest_per_key(history, |r| {
        (r.record.coin_id.clone(), r.record.symbol.clone())
    });

    let mut rows: Vec<LastPriceRow> = latest
        .into_values()
        .map(|stored| LastPriceRow {
            coin_id: stored.record.coin_id.clone(),
            symbol: stored.record.symbol.clone(),
            price: stored.record.price,
            last_collected: stored.record.timestamp,
            analysis_timestamp,
        })
        .collect();

    rows.sort_by(|a, b| (&a.coin_id, &a.symbol).cmp(&(&b.coin_id, &b.symbol)));
    rows
}

pub async fn run(
    history: &[StoredPriceRecord],
    sink: &dyn AnalyticsSink,
    analysis_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let rows = compute(history, analysis_timestamp);
    sink.append_last_prices(&rows).await?;

    info!("Appended {} last price rows", rows.len());
    Ok(rows.len())
}
