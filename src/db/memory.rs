//! In-process store used when no PostgreSQL section is configured.
//!
//! History is lost on restart. Also backs the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::models::{
    AveragePriceRow, DailyPriceChangeRow, DominanceRow, LastPriceRow, PriceRecord, RankingKind,
    RankingRow, StoredPriceRecord, VolumeChangeRow, WeeklyVolatilityRow,
};
use crate::db::store::{AnalyticsSink, PriceStore};
use crate::error::Result;

#[derive(Default)]
struct PriceLog {
    next_id: i64,
    records: Vec<StoredPriceRecord>,
}

/// Snapshot of every derived table held in memory.
#[derive(Debug, Default, Clone)]
pub struct AnalyticsTables {
    pub marketcap_ranking: Vec<RankingRow>,
    pub volume_ranking: Vec<RankingRow>,
    pub dominance: Vec<DominanceRow>,
    pub volume_changes: Vec<VolumeChangeRow>,
    pub average_prices: Vec<AveragePriceRow>,
    pub last_prices: Vec<LastPriceRow>,
    pub daily_price_changes: Vec<DailyPriceChangeRow>,
    pub weekly_volatility: Vec<WeeklyVolatilityRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    log: RwLock<PriceLog>,
    tables: RwLock<AnalyticsTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tables(&self) -> AnalyticsTables {
        self.tables.read().await.clone()
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn insert_many(&self, records: &[PriceRecord]) -> Result<usize> {
        let mut log = self.log.write().await;
        for record in records {
            log.next_id += 1;
            let id = log.next_id;
            log.records.push(StoredPriceRecord::new(id, record.clone()));
        }
        Ok(records.len())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.log.read().await.records.len() as u64)
    }

    async fn find_latest(&self, coin_id: &str) -> Result<Option<StoredPriceRecord>> {
        let log = self.log.read().await;
        let mut latest: Option<&StoredPriceRecord> = None;
        for stored in log.records.iter().filter(|r| r.record.coin_id == coin_id) {
            if latest.map_or(true, |current| stored.is_newer_than(current)) {
                latest = Some(stored);
            }
        }
        Ok(latest.cloned())
    }

    async fn distinct_coin_ids(&self) -> Result<Vec<String>> {
        let log = self.log.read().await;
        let mut ids: Vec<String> = log.records.iter().map(|r| r.record.coin_id.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn load_history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredPriceRecord>> {
        let log = self.log.read().await;
        Ok(log
            .records
            .iter()
            .filter(|r| since.map_or(true, |since| r.record.timestamp >= since))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsSink for MemoryStore {
    async fn replace_ranking(&self, kind: RankingKind, rows: &[RankingRow]) -> Result<()> {
        let mut tables = self.tables.write().await;
        match kind {
            RankingKind::MarketCap => tables.marketcap_ranking = rows.to_vec(),
            RankingKind::Volume => tables.volume_ranking = rows.to_vec(),
        }
        Ok(())
    }

    async fn append_dominance(&self, rows: &[DominanceRow]) -> Result<()> {
        self.tables.write().await.dominance.extend_from_slice(rows);
        Ok(())
    }

    async fn append_volume_changes(&self, rows: &[VolumeChangeRow]) -> Result<()> {
        self.tables.write().await.volume_changes.extend_from_slice(rows);
        Ok(())
    }

    async fn append_average_prices(&self, rows: &[AveragePriceRow]) -> Result<()> {
        self.tables.write().await.average_prices.extend_from_slice(rows);
        Ok(())
    }

    async fn append_last_prices(&self, rows: &[LastPriceRow]) -> Result<()> {
        self.tables.write().await.last_prices.extend_from_slice(rows);
        Ok(())
    }

    async fn append_daily_price_changes(&self, rows: &[DailyPriceChangeRow]) -> Result<()> {
        self.tables
            .write()
            .await
            .daily_price_changes
            .extend_from_slice(rows);
        Ok(())
    }

    async fn append_weekly_volatility(&self, rows: &[WeeklyVolatilityRow]) -> Result<()> {
        self.tables
            .write()
            .await
            .weekly_volatility
            .extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(coin: &str, secs: i64, price: f64) -> PriceRecord {
        PriceRecord::new(
            coin.to_string(),
            coin.to_string(),
            price,
            None,
            None,
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ids_are_assigned_in_insertion_order() {
        let store = MemoryStore::new();
        store
            .insert_many(&[record("bitcoin", 10, 1.0), record("ethereum", 10, 2.0)])
            .await
            .unwrap();
        store.insert_many(&[record("bitcoin", 20, 3.0)]).await.unwrap();

        let history = store.load_history(None).await.unwrap();
        let ids: Vec<i64> = history.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_latest_prefers_lowest_id_on_equal_timestamps() {
        let store = MemoryStore::new();
        store
            .insert_many(&[
                record("bitcoin", 50, 1.0),
                record("bitcoin", 50, 2.0),
                record("bitcoin", 40, 3.0),
            ])
            .await
            .unwrap();

        let latest = store.find_latest("bitcoin").await.unwrap().unwrap();
        assert_eq!(latest.id, 1);
        assert_eq!(latest.record.price, 1.0);
        assert!(store.find_latest("dogecoin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_ids_and_since_filter() {
        let store = MemoryStore::new();
        store
            .insert_many(&[
                record("solana", 10, 1.0),
                record("bitcoin", 20, 1.0),
                record("solana", 30, 1.0),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.distinct_coin_ids().await.unwrap(),
            vec!["bitcoin".to_string(), "solana".to_string()]
        );

        let since = Utc.timestamp_opt(20, 0).unwrap();
        assert_eq!(store.load_history(Some(since)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rankings_overwrite_and_others_append() {
        let store = MemoryStore::new();
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        let row = RankingRow {
            coin_id: "bitcoin".into(),
            symbol: "btc".into(),
            week_start: ts,
            weekly_value: Some(1.0),
            rank_position: 1,
            analysis_timestamp: ts,
        };
        let dominance = DominanceRow {
            coin_id: "bitcoin".into(),
            symbol: "btc".into(),
            market_cap: 1.0,
            market_dominance_pct: 100.0,
            analysis_timestamp: ts,
        };

        for _ in 0..2 {
            store
                .replace_ranking(RankingKind::MarketCap, &[row.clone()])
                .await
                .unwrap();
            store.append_dominance(&[dominance.clone()]).await.unwrap();
        }

        let tables = store.tables().await;
        assert_eq!(tables.marketcap_ranking.len(), 1);
        assert!(tables.volume_ranking.is_empty());
        assert_eq!(tables.dominance.len(), 2);
    }
}
