//! Background jobs for the query cache.
//!
//! - `stale_cleanup`: drops freshness entries whose target age is long past
//!
//! # Usage
//!
//! ```ignore
//! use vantage_storage::jobs::{stale_cleanup_task, StaleCleanupConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let index = factory.freshness_index();
//! let handle = tokio::spawn(stale_cleanup_task(index, StaleCleanupConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

pub mod stale_cleanup;

pub use stale_cleanup::{
    run_cleanup_cycle, stale_cleanup_task, StaleCleanupConfig, StaleCleanupMetrics,
    StaleCleanupSnapshot,
};
