//! Analysis jobs over the stored price history.
//!
//! Every job exposes a pure `compute` over the loaded history and an async
//! `run` that writes its rows to the [`AnalyticsSink`](crate::db::AnalyticsSink).

pub mod average_price;
pub mod daily_price_change;
pub mod grouping;
pub mod last_price;
pub mod market_dominance;
pub mod volume_change;
pub mod weekly_ranking;
pub mod weekly_volatility;
