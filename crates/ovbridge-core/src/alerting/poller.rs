//! Background poll loop
//!
//! Each cycle fetches critical alerts, runs them through the
//! [`AlertProcessor`], then sweeps expired dedup entries. The wait between
//! cycles is raced against the shutdown token so the loop exits promptly.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::oneview::AlertSource;

use super::dedup::DEFAULT_TTL_HOURS;
use super::processor::{AlertProcessor, BatchReport};

/// Outcome of a single poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Claim and delivery counts
    pub batch: BatchReport,
    /// Dedup entries evicted by the sweep
    pub swept: usize,
}

/// Periodically pulls alerts from OneView and forwards new ones
pub struct Poller {
    source: Arc<AlertSource>,
    processor: Arc<AlertProcessor>,
    interval: Duration,
    ttl: chrono::Duration,
}

impl Poller {
    /// Create a poller with the default 24h dedup retention
    pub fn new(source: Arc<AlertSource>, processor: Arc<AlertProcessor>, interval: Duration) -> Self {
        Self {
            source,
            processor,
            interval,
            ttl: chrono::Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    /// Override the dedup retention
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Run until `cancel` fires. A failing cycle is logged and the loop goes on.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting OneView alert polling service");

        while !cancel.is_cancelled() {
            let cycle = AssertUnwindSafe(self.run_cycle(&cancel)).catch_unwind().await;
            if cycle.is_err() {
                error!("Poll cycle panicked; continuing with next cycle");
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("OneView alert polling stopped");
    }

    /// Fetch, claim and deliver, then sweep
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let alerts = self.source.fetch_critical_alerts().await;
        let batch = self.processor.process_all(&alerts, cancel).await;

        if batch.processed > 0 {
            info!(count = batch.processed, "Processed new critical alerts");
        }
        if batch.failed > 0 {
            error!(count = batch.failed, "Alerts could not be delivered");
        }

        let dedup = self.processor.dedup();
        let swept = dedup.sweep_expired(Utc::now(), self.ttl);
        if swept > 0 {
            info!(count = swept, "Cleaned up old alert records");
        }

        metrics::gauge!("processed_alerts_count").set(dedup.size() as f64);
        debug!(tracked = dedup.size(), "Poll cycle complete");

        CycleReport { batch, swept }
    }
}
