use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::db::models::TrackedCoins;
use crate::error::{CoinPulseError, Result};

/// JSON file holding the tracked coin ids as a plain string array.
#[derive(Debug, Clone)]
pub struct TrackedCoinsFile {
    path: PathBuf,
}

impl TrackedCoinsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. `Ok(None)` when it does not exist.
    pub async fn try_load(&self) -> Result<Option<TrackedCoins>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoinPulseError::configuration(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            },
        };

        let ids: Vec<String> = serde_json::from_str(&json).map_err(|e| {
            CoinPulseError::configuration(format!("invalid {}: {}", self.path.display(), e))
        })?;

        Ok(Some(TrackedCoins::from_ids(ids)))
    }

    /// Reads the file, falling back to `defaults` when it is missing,
    /// empty or unreadable.
    pub async fn load_or_default(&self, defaults: &[String]) -> TrackedCoins {
        match self.try_load().await {
            Ok(Some(coins)) if !coins.is_empty() => {
                info!(
                    "Loaded {} tracked coins from {}",
                    coins.len(),
                    self.path.display()
                );
                return coins;
            },
            Ok(_) => {
                info!(
                    "No tracked coins in {}, using {} defaults",
                    self.path.display(),
                    defaults.len()
                );
            },
            Err(e) => {
                warn!("{}, using {} default coins", e, defaults.len());
            },
        }
        TrackedCoins::from_ids(defaults)
    }

    /// Writes the whole list, replacing the previous file atomically.
    pub async fn save(&self, coins: &TrackedCoins) -> Result<()> {
        let json = serde_json::to_string(coins)
            .map_err(|e| CoinPulseError::persistence(format!("serialize tracked coins: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            CoinPulseError::persistence(format!("write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            CoinPulseError::persistence(format!("replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}
