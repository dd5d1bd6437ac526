//! Rate-limited ingestion on top of a [`PriceApi`].
//!
//! Current prices are fetched in small sequential batches with a mandatory
//! pause between batches. Every upstream call runs under a timeout and a
//! fixed-delay retry policy; only transient failures are retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::CoinGeckoSettings;
use crate::db::models::PriceRecord;
use crate::error::{CoinPulseError, Result};
use crate::utils::Clock;
use crate::worker::api::{MarketChart, PriceApi};

/// Per-call timeout plus fixed-delay retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Receives the records of each successfully fetched batch.
#[async_trait]
pub trait BatchHandler: Send {
    /// Returns how many records were accepted.
    async fn handle(&mut self, records: Vec<PriceRecord>) -> Result<usize>;
}

#[async_trait]
impl BatchHandler for Vec<PriceRecord> {
    async fn handle(&mut self, records: Vec<PriceRecord>) -> Result<usize> {
        let count = records.len();
        self.extend(records);
        Ok(count)
    }
}

/// Counters of one batched ingestion pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub batches: usize,
    pub pauses: usize,
    pub records: usize,
    pub failed_batches: usize,
    pub cancelled: bool,
}

#[derive(Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    current_price: f64,
    total_volume: Option<f64>,
    market_cap: Option<f64>,
    last_updated: Option<String>,
}

fn parse_market_entry(entry: Value, fetched_at: DateTime<Utc>) -> Result<PriceRecord> {
    let entry: MarketEntry = serde_json::from_value(entry)
        .map_err(|e| CoinPulseError::upstream(format!("malformed markets entry: {}", e)))?;

    let timestamp = entry
        .last_updated
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(fetched_at);

    Ok(PriceRecord::new(
        entry.id,
        entry.symbol,
        entry.current_price,
        entry.total_volume,
        entry.market_cap,
        timestamp,
    ))
}

/// Builds records from the index-aligned chart series.
///
/// Points without a price or with an unrepresentable timestamp are dropped.
fn chart_records(coin_id: &str, chart: &MarketChart) -> Vec<PriceRecord> {
    chart
        .prices
        .iter()
        .enumerate()
        .filter_map(|(i, (millis, price))| {
            let price = (*price)?;
            let timestamp = DateTime::from_timestamp_millis(*millis as i64)?;
            let market_cap = chart.market_caps.get(i).and_then(|(_, v)| *v);
            let volume = chart.total_volumes.get(i).and_then(|(_, v)| *v);
            Some(PriceRecord::new(
                coin_id.to_string(),
                coin_id.to_string(),
                price,
                volume,
                market_cap,
                timestamp,
            ))
        })
        .collect()
}

async fn with_retry<T, F, Fut>(operation: &str, policy: RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(CoinPulseError::transient(
                operation,
                format!("timed out after {:?}", policy.timeout),
            )),
        };

        match outcome {
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation, attempt, policy.max_attempts, e, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            },
            other => return other,
        }
    }
}

pub struct IngestionClient {
    api: Arc<dyn PriceApi>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    batch_pause: Duration,
    markets_policy: RetryPolicy,
    chart_policy: RetryPolicy,
    symbol_timeout: Duration,
    /// Resolved display symbols by coin id
    symbols: Cache<String, String>,
}

impl IngestionClient {
    pub fn new(api: Arc<dyn PriceApi>, clock: Arc<dyn Clock>, settings: &CoinGeckoSettings) -> Self {
        let symbols = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(24 * 3600))
            .build();

        Self {
            api,
            clock,
            batch_size: settings.batch_size.max(1),
            batch_pause: Duration::from_secs(settings.batch_pause_secs),
            markets_policy: RetryPolicy {
                timeout: Duration::from_secs(settings.markets_timeout_secs),
                max_attempts: settings.markets_max_attempts.max(1),
                delay: Duration::from_secs(settings.markets_retry_delay_secs),
            },
            chart_policy: RetryPolicy {
                timeout: Duration::from_secs(settings.chart_timeout_secs),
                max_attempts: settings.chart_max_attempts.max(1),
                delay: Duration::from_secs(settings.chart_retry_delay_secs),
            },
            symbol_timeout: Duration::from_secs(settings.symbol_timeout_secs),
            symbols,
        }
    }

    /// Fetches current prices for every id and returns all records.
    pub async fn fetch_current_prices(&self, ids: &[String]) -> Vec<PriceRecord> {
        let mut records = Vec::new();
        self.fetch_current_batches(ids, &mut records, &CancellationToken::new())
            .await;
        records
    }

    /// Fetches current prices batch by batch, handing each batch to `handler`.
    ///
    /// A batch that fails to fetch or to be handled is logged and skipped.
    /// Cancellation is honoured between batches only.
    pub async fn fetch_current_batches(
        &self,
        ids: &[String],
        handler: &mut dyn BatchHandler,
        cancel: &CancellationToken,
    ) -> IngestSummary {
        let batches: Vec<&[String]> = ids.chunks(self.batch_size).collect();
        let total = batches.len();
        let mut summary = IngestSummary::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Ingestion cancelled before batch {}/{}", index + 1, total);
                summary.cancelled = true;
                break;
            }

            summary.batches += 1;
            info!("Fetching batch {}/{}: {:?}", index + 1, total, batch);

            match self.fetch_batch(batch).await {
                Ok(records) => match handler.handle(records).await {
                    Ok(accepted) => summary.records += accepted,
                    Err(e) => {
                        error!("Failed to store batch {:?}: {}", batch, e);
                        summary.failed_batches += 1;
                    },
                },
                Err(e) => {
                    error!("Failed to fetch batch {:?}: {}", batch, e);
                    summary.failed_batches += 1;
                },
            }

            if index + 1 < total {
                summary.pauses += 1;
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        summary
    }

    async fn fetch_batch(&self, batch: &[String]) -> Result<Vec<PriceRecord>> {
        let fetched_at = self.clock.now();
        let entries = with_retry("markets", self.markets_policy, || self.api.markets(batch)).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| match parse_market_entry(entry, fetched_at) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping entry in batch {:?}: {}", batch, e);
                    None
                },
            })
            .collect())
    }

    /// Daily history of one coin for the last `days` days.
    ///
    /// Records carry the resolved display symbol, or the id when the symbol
    /// lookup fails.
    pub async fn fetch_historical_prices(&self, coin_id: &str, days: u32) -> Result<Vec<PriceRecord>> {
        let chart = with_retry("market_chart", self.chart_policy, || {
            self.api.market_chart(coin_id, days)
        })
        .await?;

        let mut records = chart_records(coin_id, &chart);
        if records.is_empty() {
            warn!("No historical prices returned for {}", coin_id);
            return Ok(records);
        }

        let symbol = self.resolve_symbol(coin_id).await;
        for record in &mut records {
            record.symbol = symbol.clone();
        }
        Ok(records)
    }

    async fn resolve_symbol(&self, coin_id: &str) -> String {
        if let Some(symbol) = self.symbols.get(coin_id).await {
            return symbol;
        }

        match tokio::time::timeout(self.symbol_timeout, self.api.coin_symbol(coin_id)).await {
            Ok(Ok(symbol)) if !symbol.is_empty() => {
                self.symbols.insert(coin_id.to_string(), symbol.clone()).await;
                symbol
            },
            Ok(Ok(_)) => {
                warn!("Empty symbol for {}, using id as symbol", coin_id);
                coin_id.to_string()
            },
            Ok(Err(e)) => {
                warn!("Failed to resolve symbol for {}: {}, using id as symbol", coin_id, e);
                coin_id.to_string()
            },
            Err(_) => {
                warn!("Symbol lookup for {} timed out, using id as symbol", coin_id);
                coin_id.to_string()
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::{CoinPulseError, Result};
    use crate::worker::api::{MarketChart, PriceApi};

    /// Scripted upstream: queued failures are returned first, then success.
    #[derive(Default)]
    pub struct FakeApi {
        pub market_calls: Mutex<Vec<Vec<String>>>,
        pub market_failures: Mutex<VecDeque<CoinPulseError>>,
        /// Replaces the generated markets body when set
        pub markets_body: Mutex<Option<Vec<Value>>>,
        pub markets_delay: Option<Duration>,
        pub markets_in_flight: AtomicUsize,
        pub markets_in_flight_max: AtomicUsize,
        pub chart: Mutex<MarketChart>,
        pub chart_failures: Mutex<VecDeque<CoinPulseError>>,
        pub chart_calls: AtomicUsize,
        pub symbol: Option<String>,
        pub symbol_calls: AtomicUsize,
    }

    impl FakeApi {
        pub fn market_call_count(&self) -> usize {
            self.market_calls.lock().unwrap().len()
        }

        pub fn max_markets_in_flight(&self) -> usize {
            self.markets_in_flight_max.load(Ordering::SeqCst)
        }

        pub fn fail_markets(&self, errors: impl IntoIterator<Item = CoinPulseError>) {
            self.market_failures.lock().unwrap().extend(errors);
        }

        pub fn fail_charts(&self, errors: impl IntoIterator<Item = CoinPulseError>) {
            self.chart_failures.lock().unwrap().extend(errors);
        }
    }

    pub fn market_entry(id: &str, price: f64, market_cap: f64) -> Value {
        json!({
            "id": id,
            "symbol": &id[..3.min(id.len())],
            "current_price": price,
            "market_cap": market_cap,
            "total_volume": price * 10.0,
            "last_updated": "2024-03-13T12:00:00.000Z",
        })
    }

    #[async_trait]
    impl PriceApi for FakeApi {
        async fn markets(&self, ids: &[String]) -> Result<Vec<Value>> {
            self.market_calls.lock().unwrap().push(ids.to_vec());
            let in_flight = self.markets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.markets_in_flight_max.fetch_max(in_flight, Ordering::SeqCst);
            if let Some(delay) = self.markets_delay {
                tokio::time::sleep(delay).await;
            }
            self.markets_in_flight.fetch_sub(1, Ordering::SeqCst);
            let failure = self.market_failures.lock().unwrap().pop_front();
            if let Some(e) = failure {
                return Err(e);
            }
            if let Some(body) = self.markets_body.lock().unwrap().clone() {
                return Ok(body);
            }
            Ok(ids.iter().map(|id| market_entry(id, 100.0, 1_000.0)).collect())
        }

        async fn market_chart(&self, _coin_id: &str, _days: u32) -> Result<MarketChart> {
            self.chart_calls.fetch_add(1, Ordering::SeqCst);
            let failure = self.chart_failures.lock().unwrap().pop_front();
            if let Some(e) = failure {
                return Err(e);
            }
            Ok(self.chart.lock().unwrap().clone())
        }

        async fn coin_symbol(&self, coin_id: &str) -> Result<String> {
            self.symbol_calls.fetch_add(1, Ordering::SeqCst);
            self.symbol
                .clone()
                .ok_or_else(|| CoinPulseError::upstream(format!("no symbol for {}", coin_id)))
        }
    }
}
