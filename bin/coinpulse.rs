use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use coinpulse::db::TrackedCoinsFile;
use coinpulse::utils::SystemClock;
use coinpulse::{
    AnalysisEngine, CoinGeckoApi, CronScheduler, Database, IngestionClient, IngestionService,
    Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Settings::new().context("Failed to load config.yaml. Please ensure it is valid")?;

    let db = Database::new(&settings)
        .await
        .context("Failed to initialize price store")?;

    let coins_file = TrackedCoinsFile::new(&settings.tracking.coins_file);
    let coins = coins_file
        .load_or_default(&settings.tracking.default_coins)
        .await;
    info!("Tracking {} coins: {:?}", coins.len(), coins.as_slice());

    let clock = Arc::new(SystemClock);
    let api = Arc::new(CoinGeckoApi::new(&settings.coingecko).context("Invalid coingecko settings")?);
    let client = IngestionClient::new(api, clock.clone(), &settings.coingecko);

    let ingestion = Arc::new(IngestionService::new(
        client,
        db.store.clone(),
        coins_file,
        coins,
        &settings,
    ));
    let analysis = Arc::new(AnalysisEngine::new(
        db.store.clone(),
        db.sink.clone(),
        clock,
        settings.analysis.history_days,
    ));

    let scheduler = CronScheduler::new(ingestion, analysis, settings.scheduler.clone());

    return run(settings, scheduler).await;
}

async fn run(settings: Settings, scheduler: CronScheduler) -> anyhow::Result<()> {
    // Bootstrap history on a fresh store before the first analysis
    if let Err(e) = scheduler
        .initialize_historical_data_if_needed(settings.tracking.backfill_days)
        .await
    {
        error!("Historical backfill failed: {:#}", e);
    }

    if settings.scheduler.auto_start {
        scheduler
            .start()
            .await
            .context("Failed to start cron scheduler")?;
    } else {
        warn!("Scheduler auto start is disabled");
    }
    info!("Scheduler {}", scheduler.status().await);

    match scheduler.last_prices().await {
        Ok(latest) => {
            for stored in latest {
                info!(
                    "Last price {} ({}): {} at {}",
                    stored.record.coin_id,
                    stored.record.symbol,
                    stored.record.price,
                    stored.record.timestamp
                );
            }
        },
        Err(e) => error!("Failed to read last prices: {:#}", e),
    }

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Tracker running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Waiting for in-flight runs to finish...");
    scheduler.stop().await?;

    info!("Shutdown complete");
    Ok(())
}
