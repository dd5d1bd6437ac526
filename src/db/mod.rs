use std::sync::Arc;

use log::{info, warn};

use crate::config::Settings;

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
pub mod tracked_coins_file;

pub use memory::{AnalyticsTables, MemoryStore};
pub use postgres::PostgresClient;
pub use store::{AnalyticsSink, PriceStore};
pub use tracked_coins_file::TrackedCoinsFile;

/// Price history plus the analysis sink, backed by the same engine.
///
/// PostgreSQL when configured, otherwise an in-process store whose
/// contents vanish on restart.
#[derive(Clone)]
pub struct Database {
    pub store: Arc<dyn PriceStore>,
    pub sink: Arc<dyn AnalyticsSink>,
}

impl Database {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        match &settings.postgres {
            Some(pg_settings) => {
                let postgres = PostgresClient::new(pg_settings.clone()).await?;
                postgres.migrate().await?;

                let postgres = Arc::new(postgres);
                info!("Using PostgreSQL price store");
                Ok(Self {
                    store: postgres.clone(),
                    sink: postgres,
                })
            },
            None => {
                warn!("No postgres section configured, price history is kept in memory only");
                Ok(Self::in_memory(Arc::new(MemoryStore::new())))
            },
        }
    }

    pub fn in_memory(memory: Arc<MemoryStore>) -> Self {
        Self {
            store: memory.clone(),
            sink: memory,
        }
    }
}
