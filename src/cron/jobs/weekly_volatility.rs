//! Job to measure price dispersion per coin and week.
//!
//! Weeks with fewer than [`MIN_OBSERVATIONS`] records are skipped, as is any
//! week whose mean price is zero.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::cron::jobs::grouping::by_coin_week;
use crate::db::models::{StoredPriceRecord, WeeklyVolatilityRow};
use crate::db::AnalyticsSink;
use crate::utils::{mean, pct_of, sample_stddev};

pub const MIN_OBSERVATIONS: usize = 3;

pub fn compute(
    history: &[StoredPriceRecord],
    analysis_timestamp: DateTime<Utc>,
) -> Vec<WeeklyVolatilityRow> {
    let mut rows = Vec::new();

    for (coin_id, weeks) in by_coin_week(history) {
        for (week, group) in &weeks {
            let prices = group.prices();
            if prices.len() < MIN_OBSERVATIONS {
                continue;
            }

            let (Some(avg), Some(stddev)) = (mean(&prices), sample_stddev(&prices)) else {
                continue;
            };
            let Some(volatility_pct) = pct_of(stddev, avg) else {
                continue;
            };

            let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
            let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            rows.push(WeeklyVolatilityRow {
                coin_id: coin_id.clone(),
                symbol: group.symbol().to_string(),
                week: *week,
                price_range: max - min,
                volatility_pct,
                record_count: prices.len() as i64,
                analysis_timestamp,
            });
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
    sink.append_weekly_volatility(&rows).await?;

    info!("Appended {} weekly volatility rows", rows.len());
    Ok(rows.len())
}
