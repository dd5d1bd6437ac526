//! Ordered partitions of the price history shared by the windowed jobs.
//!
//! `BTreeMap` keys keep coins and periods sorted, so lag and rank passes
//! are a single linear scan per partition.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::db::models::StoredPriceRecord;
use crate::utils::{day_of, week_start};

/// Records of one coin within one period.
pub struct PeriodGroup<'a> {
    latest: &'a StoredPriceRecord,
    pub records: Vec<&'a StoredPriceRecord>,
}

impl<'a> PeriodGroup<'a> {
    fn new(first: &'a StoredPriceRecord) -> Self {
        Self {
            latest: first,
            records: vec![first],
        }
    }

    fn push(&mut self, record: &'a StoredPriceRecord) {
        if record.is_newer_than(self.latest) {
            self.latest = record;
        }
        self.records.push(record);
    }

    /// Symbol of the most recent record, which carries any backfilled ticker.
    pub fn symbol(&self) -> &str {
        &self.latest.record.symbol
    }

    pub fn prices(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.record.price).collect()
    }

    pub fn volumes(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.records.iter().map(|r| r.record.volume)
    }
}

pub type CoinPeriods<'a, P> = BTreeMap<String, BTreeMap<P, PeriodGroup<'a>>>;

fn group_by<'a, P, F>(history: &'a [StoredPriceRecord], period: F) -> CoinPeriods<'a, P>
where
    P: Ord,
    F: Fn(DateTime<Utc>) -> P,
{
    let mut groups: CoinPeriods<'a, P> = BTreeMap::new();
    for stored in history {
        let periods = groups.entry(stored.record.coin_id.clone()).or_default();
        match periods.entry(period(stored.record.timestamp)) {
            std::collections::btree_map::Entry::Occupied(mut group) => group.get_mut().push(stored),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(PeriodGroup::new(stored));
            },
        }
    }
    groups
}

/// Partition by coin, then by UTC day.
pub fn by_coin_day(history: &[StoredPriceRecord]) -> CoinPeriods<'_, NaiveDate> {
    group_by(history, day_of)
}

/// Partition by coin, then by week start.
pub fn by_coin_week(history: &[StoredPriceRecord]) -> CoinPeriods<'_, DateTime<Utc>> {
    group_by(history, week_start)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::db::models::{PriceRecord, StoredPriceRecord};

    pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    pub fn stored(
        id: i64,
        coin: &str,
        symbol: &str,
        ts: DateTime<Utc>,
        price: f64,
        volume: Option<f64>,
        market_cap: Option<f64>,
    ) -> StoredPriceRecord {
        StoredPriceRecord::new(
            id,
            PriceRecord::new(coin.into(), symbol.into(), price, volume, market_cap, ts),
        )
    }

    pub fn price_at(id: i64, coin: &str, ts: DateTime<Utc>, price: f64) -> StoredPriceRecord {
        stored(id, coin, coin, ts, price, None, None)
    }
}
