//! Periodic ingestion and analysis.
//!
//! - [`analysis`] - Runs every analysis job over one history snapshot
//! - [`jobs`] - The individual analysis jobs
//! - [`scheduler`] - Timers, overlap guards and graceful shutdown

pub mod analysis;
pub mod jobs;
pub mod scheduler;

pub use analysis::{AnalysisEngine, AnalysisReport};
pub use scheduler::CronScheduler;
