//! Job to compute whole-history price statistics per symbol.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::db::models::{AveragePriceRow, StoredPriceRecord};
use crate::db::AnalyticsSink;

#[derive(Default)]
struct Accumulator {
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    count: i64,
}

impl Accumulator {
    fn add(&mut self, price: f64) {
        self.sum += price;
        self.min = Some(self.min.map_or(price, |m| m.min(price)));
        self.max = Some(self.max.map_or(price, |m| m.max(price)));
        self.count += 1;
    }
}

pub fn compute(history: &[StoredPriceRecord], analysis_timestamp: DateTime<Utc>) -> Vec<AveragePriceRow> {
    let mut by_symbol: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for stored in history {
        by_symbol
            .entry(stored.record.symbol.as_str())
            .or_default()
            .add(stored.record.price);
    }

    by_symbol
        .into_iter()
        .filter_map(|(symbol, acc)| {
            Some(AveragePriceRow {
                symbol: symbol.to_string(),
                avg_price: acc.sum / acc.count as f64,
                min_price: acc.min?,
                max_price: acc.max?,
                record_count: acc.count,
                analysis_timestamp,
            })
        })
        .collect()
}

pub async fn run(
    history: &[StoredPriceRecord],
    sink: &dyn AnalyticsSink,
    analysis_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let rows = compute(history, analysis_timestamp);
    sink.append_average_prices(&rows).await?;

    info!("Appended {} average price rows", rows.len());
    Ok(rows.len())
}
