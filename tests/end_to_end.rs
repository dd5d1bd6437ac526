use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use coinpulse::config::CoinGeckoSettings;
use coinpulse::db::models::TrackedCoins;
use coinpulse::db::{MemoryStore, PriceStore, TrackedCoinsFile};
use coinpulse::error::Result;
use coinpulse::utils::FixedClock;
use coinpulse::worker::MarketChart;
use coinpulse::{AnalysisEngine, IngestionClient, IngestionService, PriceApi, Settings};

struct TwoCoinApi;

#[async_trait]
impl PriceApi for TwoCoinApi {
    async fn markets(&self, ids: &[String]) -> Result<Vec<Value>> {
        assert_eq!(ids, ["bitcoin", "ethereum"]);
        Ok(vec![
            json!({
                "id": "bitcoin",
                "symbol": "btc",
                "current_price": 65_000.0,
                "market_cap": 1_280_000_000_000.0_f64,
                "total_volume": 30_000_000_000.0_f64,
                "last_updated": "2024-03-13T12:00:00.000Z",
            }),
            json!({
                "id": "ethereum",
                "symbol": "eth",
                "current_price": 3_500.0,
                "market_cap": 420_000_000_000.0_f64,
                "total_volume": 15_000_000_000.0_f64,
                "last_updated": "2024-03-13T12:00:00.000Z",
            }),
        ])
    }

    async fn market_chart(&self, _coin_id: &str, _days: u32) -> Result<MarketChart> {
        Ok(MarketChart::default())
    }

    async fn coin_symbol(&self, coin_id: &str) -> Result<String> {
        Ok(coin_id.to_string())
    }
}

#[tokio::test]
async fn test_ingest_then_market_dominance() {
    let settings: Settings = config::Config::builder()
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 13, 12, 5, 0).unwrap()));
    let store = Arc::new(MemoryStore::new());

    let client = IngestionClient::new(Arc::new(TwoCoinApi), clock.clone(), &CoinGeckoSettings::default());
    let service = IngestionService::new(
        client,
        store.clone(),
        TrackedCoinsFile::new(dir.path().join("coins_to_track.json")),
        TrackedCoins::from_ids(["bitcoin", "ethereum"]),
        &settings,
    );

    let summary = service
        .fetch_and_save_current_prices(&CancellationToken::new())
        .await;

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.pauses, 0);
    assert_eq!(store.count().await.unwrap(), 2);

    let engine = AnalysisEngine::new(store.clone(), store.clone(), clock, None);
    let report = engine.run().await.unwrap();
    assert!(report.failed.is_empty());

    let tables = store.tables().await;
    assert_eq!(tables.dominance.len(), 2);
    let total: f64 = tables.dominance.iter().map(|row| row.market_dominance_pct).sum();
    assert!((total - 100.0).abs() <= 0.05);

    let btc = tables
        .dominance
        .iter()
        .find(|row| row.coin_id == "bitcoin")
        .unwrap();
    assert_eq!(btc.symbol, "btc");
    assert_eq!(btc.market_dominance_pct, 75.29);

    let ranks: Vec<(&str, i32)> = tables
        .marketcap_ranking
        .iter()
        .map(|row| (row.coin_id.as_str(), row.rank_position))
        .collect();
    assert_eq!(ranks, vec![("bitcoin", 1), ("ethereum", 2)]);
}
