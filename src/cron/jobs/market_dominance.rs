//! Job to compute each coin's share of the total tracked market cap.
//!
//! Uses the single most recent record per coin, regardless of how far apart
//! those records are in time. Coins polled at different moments therefore
//! skew the shares; this matches how the history is collected and is not
//! corrected here.

use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::db::models::{DominanceRow, StoredPriceRecord};
use crate::db::AnalyticsSink;
use crate::utils::{latest_per_key, pct_of, sum_present};

pub fn compute(history: &[StoredPriceRecord], analysis_timestamp: DateTime<Utc>) -> Vec<DominanceRow> {
    let latest = latest_per_key(history, |r| r.record.coin_id.clone());

    let Some(total_market_cap) = sum_present(latest.values().map(|r| r.record.market_cap)) else {
        return Vec::new();
    };

    let mut rows: Vec<DominanceRow> = latest
        .values()
        .filter_map(|stored| {
            let market_cap = stored.record.market_cap?;
            let market_dominance_pct = pct_of(market_cap, total_market_cap)?;
            Some(DominanceRow {
                coin_id: stored.record.coin_id.clone(),
                symbol: stored.record.symbol.clone(),
                market_cap,
                market_dominance_pct,
                analysis_timestamp,
            })
        })
        .collect();

    rows.sort_by(|a, b| match b.market_cap.total_cmp(&a.market_cap) {
        Ordering::Equal => a.coin_id.cmp(&b.coin_id),
        other => other,
    });
    rows
}

pub async fn run(
    history: &[StoredPriceRecord],
    sink: &dyn AnalyticsSink,
    analysis_timestamp: DateTime<Utc>,
) -> Result<usize> {
    let rows = compute(history, analysis_timestamp);
    sink.append_dominance(&rows).await?;

    info!("Appended {} market dominance rows", rows.len());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::jobs::grouping::test_support::*;

    #[test]
    fn test_shares_sum_to_one_hundred() {
        let ts = at(2024, 3, 13, 12);
        let history = vec![
            stored(1, "bitcoin", "btc", ts, 1.0, None, Some(1_000.0)),
            stored(2, "ethereum", "eth", ts, 1.0, None, Some(1_000.0)),
            stored(3, "solana", "sol", ts, 1.0, None, Some(1_000.0)),
        ];

        let rows = compute(&history, ts);

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.market_dominance_pct == 33.33));
        let total: f64 = rows.iter().map(|r| r.market_dominance_pct).sum();
        assert!((total - 100.0).abs() <= 0.05);
    }

    #[test]
    fn test_uses_latest_record_per_coin() {
        let history = vec![
            stored(1, "bitcoin", "btc", at(2024, 3, 10, 0), 1.0, None, Some(9_000.0)),
            stored(2, "bitcoin", "btc", at(2024, 3, 12, 0), 1.0, None, Some(3_000.0)),
            stored(3, "ethereum", "eth", at(2024, 3, 11, 0), 1.0, None, Some(1_000.0)),
        ];

        let rows = compute(&history, at(2024, 3, 13, 0));

        assert_eq!(rows[0].coin_id, "bitcoin");
        assert_eq!(rows[0].market_cap, 3_000.0);
        assert_eq!(rows[0].market_dominance_pct, 75.0);
        assert_eq!(rows[1].market_dominance_pct, 25.0);
    }

    #[test]
    fn test_missing_caps_and_zero_total_produce_no_rows() {
        let ts = at(2024, 3, 13, 12);
        let history = vec![
            stored(1, "bitcoin", "btc", ts, 1.0, None, Some(500.0)),
            stored(2, "ethereum", "eth", ts, 1.0, None, None),
        ];
        let rows = compute(&history, ts);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].market_dominance_pct, 100.0);

        let zero = vec![stored(1, "bitcoin", "btc", ts, 1.0, None, Some(0.0))];
        assert!(compute(&zero, ts).is_empty());
        assert!(compute(&[], ts).is_empty());
    }
}
