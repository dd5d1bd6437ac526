use std::hash::Hash;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rustc_hash::FxHashMap;

use crate::db::models::StoredPriceRecord;

/// UTC calendar day of an instant.
pub fn day_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Monday 00:00 UTC of the week containing `ts`.
pub fn week_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Utc.from_utc_datetime(&monday.and_time(chrono::NaiveTime::MIN))
}

/// Keeps, for every key, the record with the greatest timestamp.
///
/// Ties on timestamp go to the lowest row id, so repeated runs over the
/// same history pick the same record.
pub fn latest_per_key<'a, K, F>(
    records: &'a [StoredPriceRecord],
    key: F,
) -> FxHashMap<K, &'a StoredPriceRecord>
where
    K: Eq + Hash,
    F: Fn(&StoredPriceRecord) -> K,
{
    let mut latest: FxHashMap<K, &StoredPriceRecord> = FxHashMap::default();
    for record in records {
        latest
            .entry(key(record))
            .and_modify(|current| {
                if record.is_newer_than(current) {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PriceRecord;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn stored(id: i64, coin: &str, ts: DateTime<Utc>, price: f64) -> StoredPriceRecord {
        StoredPriceRecord::new(
            id,
            PriceRecord::new(coin.into(), coin.into(), price, None, None, ts),
        )
    }

    #[test]
    fn test_week_start_is_monday_midnight() {
        // 2024-03-14 is a Thursday
        assert_eq!(week_start(at(2024, 3, 14, 17)), at(2024, 3, 11, 0));
        // Monday stays on itself, Sunday goes back six days
        assert_eq!(week_start(at(2024, 3, 11, 0)), at(2024, 3, 11, 0));
        assert_eq!(week_start(at(2024, 3, 17, 23)), at(2024, 3, 11, 0));
        // Crosses a month boundary
        assert_eq!(week_start(at(2024, 3, 2, 8)), at(2024, 2, 26, 0));
    }

    #[test]
    fn test_day_of_uses_utc_date() {
        assert_eq!(
            day_of(at(2024, 1, 31, 23)),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
    }

    #[test]
    fn test_latest_per_key_picks_max_timestamp_then_lowest_id() {
        let records = vec![
            stored(3, "bitcoin", at(2024, 3, 12, 10), 3.0),
            stored(1, "bitcoin", at(2024, 3, 12, 10), 1.0),
            stored(2, "bitcoin", at(2024, 3, 11, 10), 2.0),
            stored(4, "ethereum", at(2024, 3, 11, 10), 4.0),
        ];

        let latest = latest_per_key(&records, |r| r.record.coin_id.clone());

        assert_eq!(latest.len(), 2);
        assert_eq!(latest["bitcoin"].id, 1);
        assert_eq!(latest["ethereum"].id, 4);
    }

    #[test]
    fn test_latest_per_key_by_week() {
        let records = vec![
            stored(1, "bitcoin", at(2024, 3, 11, 10), 1.0),
            stored(2, "bitcoin", at(2024, 3, 13, 10), 2.0),
            stored(3, "bitcoin", at(2024, 3, 18, 10), 3.0),
        ];

        let latest = latest_per_key(&records, |r| {
            (r.record.coin_id.clone(), week_start(r.record.timestamp))
        });

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&("bitcoin".to_string(), at(2024, 3, 11, 0))].id, 2);
        assert_eq!(latest[&("bitcoin".to_string(), at(2024, 3, 18, 0))].id, 3);
    }
}
