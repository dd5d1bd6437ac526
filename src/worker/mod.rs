//! Price ingestion from the upstream market API.
//!
//! - [`api`] - The [`PriceApi`] seam and its CoinGecko implementation
//! - [`client`] - Batching, pacing, timeouts and retries
//! - [`service`] - Tracked coins, polling and historical backfill

pub mod api;
pub mod client;
pub mod service;

pub use api::{CoinGeckoApi, MarketChart, PriceApi};
pub use client::{BatchHandler, IngestSummary, IngestionClient, RetryPolicy};
pub use service::IngestionService;
