use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price for a coin.
///
/// Population: ingestion client, from `/coins/markets` (live) or
/// `/coins/{id}/market_chart` (backfill).
///
/// Immutable once written. `(coin_id, timestamp)` may repeat when the
/// same upstream snapshot is polled twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub coin_id: String,
    pub symbol: String,
    pub price: f64,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    pub fn new(
        coin_id: String,
        symbol: String,
        price: f64,
        volume: Option<f64>,
        market_cap: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            coin_id,
            symbol,
            price,
            volume,
            market_cap,
            timestamp,
        }
    }
}

/// A price record as read back from the store.
///
/// `id` is assigned by the store in insertion order and breaks ties
/// between records sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPriceRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: PriceRecord,
}

impl StoredPriceRecord {
    pub fn new(id: i64, record: PriceRecord) -> Self {
        Self { id, record }
    }

    /// True if `self` wins a "latest record" contest against `other`:
    /// later timestamp first, then the lower row id.
    pub fn is_newer_than(&self, other: &StoredPriceRecord) -> bool {
        match self.record.timestamp.cmp(&other.record.timestamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.id < other.id,
        }
    }
}
