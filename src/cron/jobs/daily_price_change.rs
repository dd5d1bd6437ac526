//! Job to compute day-over-day changes of each coin's average daily price.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::cron::jobs::grouping::by_coin_day;
use crate::db::models::{DailyPriceChangeRow, StoredPriceRecord};
use crate::db::AnalyticsSink;
use crate::utils::{mean, pct_change};

pub fn compute(
    history: &[StoredPriceRecord],
    analysis_timestamp: DateTime<Utc>,
) -> Vec<DailyPriceChangeRow> {
    let mut rows = Vec::new();

    for (coin_id, days) in by_coin_day(history) {
        let mut previous: Option<f64> = None;

        for (date, group) in &days {
            let Some(day_avg) = mean(&group.prices()) else {
                continue;
            };

            if let Some(start_price) = previous {
                if let Some(change) = pct_change(Some(start_price), Some(day_avg)) {
                    rows.push(DailyPriceChangeRow {
                        coin_id: coin_id.clone(),
                        symbol: group.symbol().to_string(),
                        date: *date,
                        start_price,
                        end_price: day_avg,
                        price_change_pct: change,
                        analysis_timestamp,
                    });
                }
            }
            previous = Some(day_avg);
        }
    }

    rows
}

pub async fn run(
    history: &[StoredPriceRecord],
    sink: &dyn AnalyticsSink,
    analysis_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let rows = compute(history, analysis_timestamp);
    sink.append_daily_price_changes(&rows).await?;

    info!("Appended {} daily price change rows", rows.len());
    Ok(rows.len())
}
