//! Ingestion entry points: tracked coin management, current price polling
//! and historical backfill.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::db::models::{normalize_coin_id, PriceRecord, StoredPriceRecord, TrackedCoins};
use crate::db::{PriceStore, TrackedCoinsFile};
use crate::error::{CoinPulseError, Result};
use crate::worker::client::{BatchHandler, IngestSummary, IngestionClient};

/// Accepted range for a forced backfill, in days.
pub const BACKFILL_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=365;

/// Saves every fetched batch as soon as it arrives.
struct StoreWriter<'a> {
    store: &'a dyn PriceStore,
}

#[async_trait]
impl<'a> BatchHandler for StoreWriter<'a> {
    async fn handle(&mut self, records: Vec<PriceRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.store.insert_many(&records).await
    }
}

pub struct IngestionService {
    client: IngestionClient,
    store: Arc<dyn PriceStore>,
    coins: Mutex<TrackedCoins>,
    coins_file: TrackedCoinsFile,
    backfill_pause: Duration,
    backfill_threshold: u64,
}

impl IngestionService {
    pub fn new(
        client: IngestionClient,
        store: Arc<dyn PriceStore>,
        coins_file: TrackedCoinsFile,
        coins: TrackedCoins,
        settings: &Settings,
    ) -> Self {
        Self {
            client,
            store,
            coins: Mutex::new(coins),
            coins_file,
            backfill_pause: Duration::from_secs(settings.coingecko.backfill_pause_secs),
            backfill_threshold: settings.tracking.backfill_threshold,
        }
    }

    pub async fn tracked_coins(&self) -> Vec<String> {
        self.coins.lock().await.as_slice().to_vec()
    }

    /// Starts tracking `coin_id` and persists the list.
    ///
    /// Returns `Ok(false)` if the id was already tracked. The in-memory set
    /// keeps the new id even if writing the file fails.
    pub async fn add_tracked_coin(&self, coin_id: &str) -> Result<bool> {
        let id = normalize_coin_id(coin_id);
        let mut coins = self.coins.lock().await;

        if !coins.insert(&id) {
            info!("Coin {:?} is already tracked", id);
            return Ok(false);
        }

        self.coins_file.save(&coins).await?;
        info!("Now tracking {} ({} coins)", id, coins.len());
        Ok(true)
    }

    /// Stops tracking `coin_id` and persists the list.
    ///
    /// Returns `Ok(false)` if the id was not tracked.
    pub async fn remove_tracked_coin(&self, coin_id: &str) -> Result<bool> {
        let id = normalize_coin_id(coin_id);
        let mut coins = self.coins.lock().await;

        if !coins.remove(&id) {
            warn!("Coin {:?} is not tracked", id);
            return Ok(false);
        }

        self.coins_file.save(&coins).await?;
        info!("Stopped tracking {} ({} coins)", id, coins.len());
        Ok(true)
    }

    /// Polls current prices for every tracked coin, saving batch by batch.
    ///
    /// A batch that cannot be fetched or saved is skipped; the rest still
    /// run.
    pub async fn fetch_and_save_current_prices(&self, cancel: &CancellationToken) -> IngestSummary {
        let start = Instant::now();
        let ids = self.tracked_coins().await;

        let mut writer = StoreWriter {
            store: self.store.as_ref(),
        };
        let summary = self.client.fetch_current_batches(&ids, &mut writer, cancel).await;

        info!(
            "Saved {} price records for {} coins in {:?} ({} batches, {} failed)",
            summary.records,
            ids.len(),
            start.elapsed(),
            summary.batches,
            summary.failed_batches
        );
        summary
    }

    /// Backfills `days_back` days of daily history for every tracked coin.
    ///
    /// Coins are processed one at a time with a pause in between; each
    /// coin's records are saved independently. Returns the number of
    /// records saved.
    pub async fn fetch_and_save_historical_data(
        &self,
        days_back: u32,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if !BACKFILL_DAYS_RANGE.contains(&days_back) {
            return Err(CoinPulseError::configuration(format!(
                "backfill days must be within {:?}, got {}",
                BACKFILL_DAYS_RANGE, days_back
            )));
        }

        let start = Instant::now();
        let ids = self.tracked_coins().await;
        info!("Backfilling {} days of history for {} coins", days_back, ids.len());

        let mut saved = 0;
        for (index, coin_id) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Backfill cancelled after {}/{} coins", index, ids.len());
                break;
            }

            match self.backfill_coin(coin_id, days_back).await {
                Ok(count) => {
                    saved += count;
                    info!("Backfilled {} records for {} ({}/{})", count, coin_id, index + 1, ids.len());
                },
                Err(e) => error!("Failed to backfill {}: {}", coin_id, e),
            }

            if index + 1 < ids.len() {
                tokio::time::sleep(self.backfill_pause).await;
            }
        }

        info!("Backfill finished: {} records in {:?}", saved, start.elapsed());
        Ok(saved)
    }

    async fn backfill_coin(&self, coin_id: &str, days_back: u32) -> Result<usize> {
        let records = self.client.fetch_historical_prices(coin_id, days_back).await?;
        if records.is_empty() {
            return Ok(0);
        }
        self.store.insert_many(&records).await
    }

    /// Runs a full backfill only while the store is nearly empty.
    ///
    /// Returns whether a backfill ran.
    pub async fn initialize_historical_data_if_needed(
        &self,
        days_back: u32,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let existing = self.store.count().await?;

        if existing >= self.backfill_threshold {
            info!("Found {} stored records, skipping historical backfill", existing);
            return Ok(false);
        }

        info!(
            "Only {} stored records (threshold {}), loading history",
            existing, self.backfill_threshold
        );
        self.fetch_and_save_historical_data(days_back, cancel).await?;
        Ok(true)
    }

    /// Latest stored record of every coin that has any history.
    pub async fn last_prices(&self) -> Result<Vec<StoredPriceRecord>> {
        let mut latest = Vec::new();
        for coin_id in self.store.distinct_coin_ids().await? {
            if let Some(record) = self.store.find_latest(&coin_id).await? {
                latest.push(record);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, TimeZone, Utc};
    use tokio::time::Instant as TokioInstant;

    use super::*;
    use crate::config::CoinGeckoSettings;
    use crate::db::MemoryStore;
    use crate::utils::FixedClock;
    use crate::worker::api::MarketChart;
    use crate::worker::client::test_support::FakeApi;

    fn settings() -> Settings {
        config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn service_with(
        api: Arc<FakeApi>,
        store: Arc<dyn PriceStore>,
        dir: &tempfile::TempDir,
        ids: &[&str],
    ) -> IngestionService {
        let client = IngestionClient::new(
            api,
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap())),
            &CoinGeckoSettings::default(),
        );
        IngestionService::new(
            client,
            store,
            TrackedCoinsFile::new(dir.path().join("coins_to_track.json")),
            TrackedCoins::from_ids(ids),
            &settings(),
        )
    }

    /// Memory store whose first `insert_many` fails.
    struct FlakyStore {
        inner: MemoryStore,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl PriceStore for FlakyStore {
        async fn insert_many(&self, records: &[PriceRecord]) -> Result<usize> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(CoinPulseError::persistence("deadlock detected"));
            }
            self.inner.insert_many(records).await
        }

        async fn count(&self) -> Result<u64> {
            self.inner.count().await
        }

        async fn find_latest(&self, coin_id: &str) -> Result<Option<StoredPriceRecord>> {
            self.inner.find_latest(coin_id).await
        }

        async fn distinct_coin_ids(&self) -> Result<Vec<String>> {
            self.inner.distinct_coin_ids().await
        }

        async fn load_history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredPriceRecord>> {
            self.inner.load_history(since).await
        }
    }

    fn daily_chart() -> MarketChart {
        MarketChart {
            prices: vec![
                (1_710_288_000_000.0, Some(10.0)),
                (1_710_374_400_000.0, Some(11.0)),
            ],
            ..MarketChart::default()
        }
    }

    async fn seed(store: &MemoryStore, count: usize) {
        let records: Vec<PriceRecord> = (0..count)
            .map(|i| {
                PriceRecord::new(
                    "bitcoin".into(),
                    "btc".into(),
                    i as f64,
                    None,
                    None,
                    Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                )
            })
            .collect();
        store.insert_many(&records).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_remove_persist_and_ignore_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(
            Arc::new(FakeApi::default()),
            Arc::new(MemoryStore::new()),
            &dir,
            &["bitcoin"],
        );

        assert!(service.add_tracked_coin("  Ethereum ").await.unwrap());
        assert!(!service.add_tracked_coin("ETHEREUM").await.unwrap());
        assert!(!service.remove_tracked_coin("dogecoin").await.unwrap());
        assert_eq!(service.tracked_coins().await, vec!["bitcoin", "ethereum"]);

        let file = TrackedCoinsFile::new(dir.path().join("coins_to_track.json"));
        let saved = file.try_load().await.unwrap().unwrap();
        assert_eq!(saved.as_slice(), ["bitcoin", "ethereum"]);

        assert!(service.remove_tracked_coin("Bitcoin").await.unwrap());
        let saved = file.try_load().await.unwrap().unwrap();
        assert_eq!(saved.as_slice(), ["ethereum"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_aborts_only_that_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            inserts: AtomicUsize::new(0),
        });
        let ids: Vec<String> = (0..7).map(|i| format!("coin-{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let service = service_with(Arc::new(FakeApi::default()), store.clone(), &dir, &id_refs);

        let summary = service
            .fetch_and_save_current_prices(&CancellationToken::new())
            .await;

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfill_runs_below_threshold_only() {
        let dir = tempfile::tempdir().unwrap();

        let sparse = Arc::new(MemoryStore::new());
        seed(&sparse, 99).await;
        let api = Arc::new(FakeApi::default());
        *api.chart.lock().unwrap() = daily_chart();
        let service = service_with(api.clone(), sparse.clone(), &dir, &["bitcoin"]);
        let ran = service
            .initialize_historical_data_if_needed(90, &CancellationToken::new())
            .await
            .unwrap();
        assert!(ran);
        assert_eq!(sparse.count().await.unwrap(), 101);

        let full = Arc::new(MemoryStore::new());
        seed(&full, 100).await;
        let api = Arc::new(FakeApi::default());
        let service = service_with(api.clone(), full.clone(), &dir, &["bitcoin"]);
        let ran = service
            .initialize_historical_data_if_needed(90, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!ran);
        assert_eq!(api.chart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(full.count().await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_backfill_pauses_between_coins() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(FakeApi::default());
        *api.chart.lock().unwrap() = daily_chart();
        let service = service_with(api.clone(), store.clone(), &dir, &["bitcoin", "ethereum", "solana"]);
        let start = TokioInstant::now();

        let saved = service
            .fetch_and_save_historical_data(30, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(saved, 6);
        assert_eq!(api.chart_calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed().as_secs(), 50);
        assert_eq!(store.distinct_coin_ids().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfill_cancelled_mid_pause_finishes_the_pause() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(FakeApi::default());
        *api.chart.lock().unwrap() = daily_chart();
        let service = service_with(api.clone(), store.clone(), &dir, &["bitcoin", "ethereum", "solana"]);
        let cancel = CancellationToken::new();
        let start = TokioInstant::now();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let saved = service.fetch_and_save_historical_data(30, &cancel).await.unwrap();

        assert_eq!(saved, 2);
        assert_eq!(api.chart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed().as_secs(), 25);
    }

    #[tokio::test]
    async fn test_forced_backfill_rejects_out_of_range_days() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        let service = service_with(api.clone(), Arc::new(MemoryStore::new()), &dir, &["bitcoin"]);

        for days in [0, 366] {
            let result = service
                .fetch_and_save_historical_data(days, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(CoinPulseError::Configuration(_))));
        }
        assert_eq!(api.chart_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_prices_per_coin() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let service = service_with(Arc::new(FakeApi::default()), store.clone(), &dir, &["bitcoin", "ethereum"]);

        service
            .fetch_and_save_current_prices(&CancellationToken::new())
            .await;
        service
            .fetch_and_save_current_prices(&CancellationToken::new())
            .await;

        let latest = service.last_prices().await.unwrap();
        let coins: Vec<&str> = latest.iter().map(|r| r.record.coin_id.as_str()).collect();
        assert_eq!(coins, vec!["bitcoin", "ethereum"]);
        // Equal timestamps resolve to the first stored record
        assert_eq!(latest[0].id, 1);
    }
}
