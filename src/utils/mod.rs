//! Utility functions for the coinpulse tracker.
//!
//! - [`clock`] - Injectable "now" for ingestion and analysis
//! - [`period`] - Day/week truncation and latest-per-period reduction
//! - [`stats`] - Rounding, percent change and dispersion helpers

mod clock;
mod period;
mod stats;

pub use clock::{Clock, FixedClock, SystemClock};

pub use period::{day_of, latest_per_key, week_start};

pub use stats::{mean, pct_change, pct_of, round2, sample_stddev, sum_present};
