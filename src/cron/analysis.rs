//! One analysis run: load the history once, then run every job over it.
//!
//! Jobs are isolated from each other. A job that fails is logged and the
//! remaining jobs still run; the run as a whole only fails when the history
//! cannot be loaded or when no job succeeds.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use log::{error, info};

use crate::cron::jobs;
use crate::db::models::RankingKind;
use crate::db::{AnalyticsSink, PriceStore};
use crate::utils::Clock;

/// Outcome of one analysis run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Job name and the number of rows it wrote
    pub succeeded: Vec<(&'static str, usize)>,
    pub failed: Vec<&'static str>,
}

impl AnalysisReport {
    fn record(&mut self, job: &'static str, outcome: Result<usize>) {
        match outcome {
            Ok(rows) => self.succeeded.push((job, rows)),
            Err(e) => {
                error!("Analysis job {} failed: {:#}", job, e);
                self.failed.push(job);
            },
        }
    }
}

pub struct AnalysisEngine {
    store: Arc<dyn PriceStore>,
    sink: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    history_days: Option<u32>,
}

impl AnalysisEngine {
    pub fn new(
        store: Arc<dyn PriceStore>,
        sink: Arc<dyn AnalyticsSink>,
        clock: Arc<dyn Clock>,
        history_days: Option<u32>,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            history_days,
        }
    }

    pub async fn run(&self) -> Result<AnalysisReport> {
        let start = Instant::now();
        let now = self.clock.now();
        let since = self
            .history_days
            .map(|days| now - Duration::days(i64::from(days)));

        let history = self
            .store
            .load_history(since)
            .await
            .context("Failed to load price history")?;
        info!("Starting analysis over {} price records", history.len());

        let sink = self.sink.as_ref();
        let mut report = AnalysisReport::default();

        report.record(
            "marketcap_weekly_ranking",
            jobs::weekly_ranking::run(&history, sink, RankingKind::MarketCap, now).await,
        );
        report.record(
            "volume_weekly_ranking",
            jobs::weekly_ranking::run(&history, sink, RankingKind::Volume, now).await,
        );
        report.record(
            "market_dominance",
            jobs::market_dominance::run(&history, sink, now).await,
        );
        report.record(
            "daily_volume_change",
            jobs::volume_change::run(&history, sink, now).await,
        );
        report.record(
            "average_price",
            jobs::average_price::run(&history, sink, now).await,
        );
        report.record(
            "last_price",
            jobs::last_price::run(&history, sink, now).await,
        );
        report.record(
            "daily_price_change",
            jobs::daily_price_change::run(&history, sink, now).await,
        );
        report.record(
            "weekly_volatility",
            jobs::weekly_volatility::run(&history, sink, now).await,
        );

        if report.succeeded.is_empty() {
            bail!("All {} analysis jobs failed", report.failed.len());
        }

        info!(
            "Analysis finished in {:?}: {} succeeded, {} failed",
            start.elapsed(),
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
