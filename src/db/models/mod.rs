mod analytics;
mod price_record;
mod tracked_coins;

pub use analytics::{
    AveragePriceRow, DailyPriceChangeRow, DominanceRow, LastPriceRow, RankingKind, RankingRow,
    VolumeChangeRow, WeeklyVolatilityRow,
};
pub use price_record::{PriceRecord, StoredPriceRecord};
pub use tracked_coins::{normalize_coin_id, TrackedCoins};
