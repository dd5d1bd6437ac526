//! Job to compute day-over-day changes of each coin's summed trading volume.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::cron::jobs::grouping::by_coin_day;
use crate::db::models::{StoredPriceRecord, VolumeChangeRow};
use crate::db::AnalyticsSink;
use crate::utils::{pct_change, sum_present};

pub fn compute(history: &[StoredPriceRecord], analysis_timestamp: DateTime<Utc>) -> Vec<VolumeChangeRow> {
    let mut rows = Vec::new();

    for (coin_id, days) in by_coin_day(history) {
        let mut previous: Option<Option<f64>> = None;

        for (date, group) in &days {
            let daily_volume = sum_present(group.volumes());

            // First day of a coin has nothing to lag against
            if let Some(previous_volume) = previous {
                if let (Some(volume), Some(change)) = (daily_volume, pct_change(previous_volume, daily_volume)) {
                    rows.push(VolumeChangeRow {
                        coin_id: coin_id.clone(),
                        symbol: group.symbol().to_string(),
                        date: *date,
                        daily_volume: volume,
                        volume_change_pct: change,
                        analysis_timestamp,
                    });
                }
            }
            previous = Some(daily_volume);
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
    sink.append_volume_changes(&rows).await?;

    info!("Appended {} daily volume change rows", rows.len());
    Ok(rows.len())
}
