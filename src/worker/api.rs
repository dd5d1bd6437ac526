//! HTTP access to the CoinGecko public API.
//!
//! [`PriceApi`] is the seam the ingestion client talks to. Timeouts and
//! retries are applied by the caller, so implementations perform exactly
//! one request per call.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::CoinGeckoSettings;
use crate::error::{CoinPulseError, Result};

/// Response of `/coins/{id}/market_chart`.
///
/// Each series is a list of `[unix_millis, value]` pairs. The series are
/// aligned by index; CoinGecko occasionally reports `null` values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketChart {
    #[serde(default)]
    pub prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    pub market_caps: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    pub total_volumes: Vec<(f64, Option<f64>)>,
}

#[async_trait]
pub trait PriceApi: Send + Sync {
    /// Raw `/coins/markets` entries for the given ids.
    ///
    /// Entries are returned unparsed so that one malformed entry does not
    /// invalidate the rest of the batch.
    async fn markets(&self, ids: &[String]) -> Result<Vec<Value>>;

    async fn market_chart(&self, coin_id: &str, days: u32) -> Result<MarketChart>;

    /// Display ticker of a coin, e.g. `btc` for `bitcoin`.
    async fn coin_symbol(&self, coin_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct CoinDetails {
    symbol: String,
}

pub struct CoinGeckoApi {
    http: reqwest::Client,
    base_url: Url,
}

impl CoinGeckoApi {
    pub fn new(settings: &CoinGeckoSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            CoinPulseError::configuration(format!("invalid base url {}: {}", settings.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CoinPulseError::configuration(format!(
                "base url {} cannot carry a path",
                settings.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("coinpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoinPulseError::configuration(format!("failed to build http client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut().extend_pairs(query);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PriceApi for CoinGeckoApi {
    async fn markets(&self, ids: &[String]) -> Result<Vec<Value>> {
        let url = self.endpoint(
            &["coins", "markets"],
            &[
                ("vs_currency", "usd".to_string()),
                ("ids", ids.join(",")),
                ("order", "market_cap_desc".to_string()),
                ("per_page", ids.len().to_string()),
                ("page", "1".to_string()),
                ("sparkline", "false".to_string()),
            ],
        );

        let body: Value = self.get_json(url).await?;
        match body {
            Value::Array(entries) => Ok(entries),
            other => Err(CoinPulseError::upstream(format!(
                "expected an array from /coins/markets, got {}",
                other
            ))),
        }
    }

    async fn market_chart(&self, coin_id: &str, days: u32) -> Result<MarketChart> {
        let url = self.endpoint(
            &["coins", coin_id, "market_chart"],
            &[
                ("vs_currency", "usd".to_string()),
                ("days", days.to_string()),
                ("interval", "daily".to_string()),
            ],
        );
        self.get_json(url).await
    }

    async fn coin_symbol(&self, coin_id: &str) -> Result<String> {
        let url = self.endpoint(
            &["coins", coin_id],
            &[
                ("localization", "false".to_string()),
                ("tickers", "false".to_string()),
                ("market_data", "false".to_string()),
                ("community_data", "false".to_string()),
                ("developer_data", "false".to_string()),
                ("sparkline", "false".to_string()),
            ],
        );
        let details: CoinDetails = self.get_json(url).await?;
        Ok(details.symbol)
    }
}
