//! Cron scheduler for the periodic ingestion and analysis runs.
//!
//! Runs jobs like:
//! - Polling current prices for every tracked coin
//! - Recomputing the analysis tables from the stored history
//!
//! Both jobs fire once right away and then on their own interval. A firing
//! that is still busy when the next tick arrives makes that tick a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SchedulerSettings;
use crate::cron::analysis::{AnalysisEngine, AnalysisReport};
use crate::db::models::StoredPriceRecord;
use crate::worker::IngestionService;

/// Live timers plus the firings they spawned.
struct RunState {
    scheduler: JobScheduler,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// Cron scheduler that manages the ingestion and analysis jobs.
///
/// `start` and `stop` are idempotent; calling either twice only logs a
/// warning.
pub struct CronScheduler {
    ingestion: Arc<IngestionService>,
    analysis: Arc<AnalysisEngine>,
    settings: SchedulerSettings,
    state: Mutex<Option<RunState>>,
}

async fn ingestion_firing(
    service: Arc<IngestionService>,
    running: Arc<Mutex<()>>,
    cancel: CancellationToken,
) {
    let Ok(_guard) = running.try_lock() else {
        warn!("Previous ingestion run still in progress, skipping this tick");
        return;
    };

    let summary = service.fetch_and_save_current_prices(&cancel).await;
    if summary.failed_batches > 0 {
        warn!(
            "Ingestion run finished with {}/{} failed batches",
            summary.failed_batches, summary.batches
        );
    }
}

async fn analysis_firing(engine: Arc<AnalysisEngine>, running: Arc<Mutex<()>>) {
    let Ok(_guard) = running.try_lock() else {
        warn!("Previous analysis run still in progress, skipping this tick");
        return;
    };

    if let Err(e) = engine.run().await {
        error!("Analysis run failed: {:#}", e);
    }
}

/// Waits up to `grace` for tracked firings, then cancels the stragglers and
/// waits for them to wind down.
async fn drain_firings(tracker: &TaskTracker, cancel: &CancellationToken, grace: Duration) {
    tracker.close();
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!("{} runs still in progress after {:?}, cancelling", tracker.len(), grace);
        cancel.cancel();
        tracker.wait().await;
    }
}

impl CronScheduler {
    pub fn new(
        ingestion: Arc<IngestionService>,
        analysis: Arc<AnalysisEngine>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            ingestion,
            analysis,
            settings,
            state: Mutex::new(None),
        }
    }

    /// Arms both periodic jobs and fires each of them once immediately.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            warn!("Scheduler is already running");
            return Ok(());
        }

        let scheduler = JobScheduler::new().await?;
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let service = self.ingestion.clone();
        let ingestion_running = Arc::new(Mutex::new(()));
        let ingestion_cancel = cancel.clone();
        Self::register_job(
            &scheduler,
            &tracker,
            "ingestion",
            self.settings.ingestion_interval_secs,
            move || {
                ingestion_firing(
                    service.clone(),
                    ingestion_running.clone(),
                    ingestion_cancel.clone(),
                )
            },
        )
        .await?;

        let engine = self.analysis.clone();
        let analysis_running = Arc::new(Mutex::new(()));
        Self::register_job(
            &scheduler,
            &tracker,
            "analysis",
            self.settings.analysis_interval_secs,
            move || analysis_firing(engine.clone(), analysis_running.clone()),
        )
        .await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        *state = Some(RunState {
            scheduler,
            tracker,
            cancel,
        });
        Ok(())
    }

    async fn register_job<F, Fut>(
        scheduler: &JobScheduler,
        tracker: &TaskTracker,
        name: &'static str,
        interval_secs: u64,
        firing: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job_tracker = tracker.clone();
        let job_firing = firing.clone();

        let job = Job::new_repeated_async(Duration::from_secs(interval_secs), move |_uuid, _lock| {
            let tracker = job_tracker.clone();
            let fut = job_firing();
            Box::pin(async move {
                tracker.track_future(fut).await;
            })
        })?;

        scheduler.add(job).await?;
        tracker.spawn(firing());

        info!("Registered {} job (every {}s)", name, interval_secs);
        Ok(())
    }

    /// Disarms the timers and waits for in-flight firings.
    ///
    /// Firings still running after the grace period are cancelled; they stop
    /// at their next batch or coin boundary. The state lock is held until
    /// they are done, so a concurrent `start` cannot overlap with them.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut run) = state.take() else {
            warn!("Scheduler is not running");
            return Ok(());
        };

        if let Err(e) = run.scheduler.shutdown().await {
            error!("Failed to shut down job timers: {:#}", e);
        }

        let grace = Duration::from_secs(self.settings.shutdown_grace_secs);
        drain_firings(&run.tracker, &run.cancel, grace).await;

        info!("Cron scheduler stopped");
        Ok(())
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.is_some()
    }

    pub async fn status(&self) -> String {
        if self.is_enabled().await {
            format!(
                "running (ingestion every {}s, analysis every {}s)",
                self.settings.ingestion_interval_secs, self.settings.analysis_interval_secs
            )
        } else {
            "stopped".to_string()
        }
    }

    /// One analysis run outside the schedule.
    pub async fn run_analysis(&self) -> Result<AnalysisReport> {
        self.analysis.run().await
    }

    pub async fn tracked_coins(&self) -> Vec<String> {
        self.ingestion.tracked_coins().await
    }

    pub async fn add_tracked_coin(&self, coin_id: &str) -> Result<bool> {
        Ok(self.ingestion.add_tracked_coin(coin_id).await?)
    }

    pub async fn remove_tracked_coin(&self, coin_id: &str) -> Result<bool> {
        Ok(self.ingestion.remove_tracked_coin(coin_id).await?)
    }

    pub async fn last_prices(&self) -> Result<Vec<StoredPriceRecord>> {
        Ok(self.ingestion.last_prices().await?)
    }

    /// Bootstrap backfill, skipped once the store holds enough history.
    pub async fn initialize_historical_data_if_needed(&self, days_back: u32) -> Result<bool> {
        Ok(self
            .ingestion
            .initialize_historical_data_if_needed(days_back, &CancellationToken::new())
            .await?)
    }

    /// Forced backfill of `days_back` days (1 to 365) for every tracked coin.
    pub async fn fetch_and_save_historical_data(&self, days_back: u32) -> Result<usize> {
        Ok(self
            .ingestion
            .fetch_and_save_historical_data(days_back, &CancellationToken::new())
            .await?)
    }
}
