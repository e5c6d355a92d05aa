//! Alert lifecycle engine
//!
//! Dedup claims, PagerDuty delivery, the shared claim-then-deliver sequence,
//! and the background poll loop.

mod dedup;
mod notifier;
mod poller;
mod processor;

pub use dedup::{DedupCache, DEFAULT_TTL_HOURS};
pub use notifier::{DeliveryClient, DeliveryFailure, DeliveryOutcome, EventAction};
pub use poller::{CycleReport, Poller};
pub use processor::{AlertProcessor, BatchReport, ProcessOutcome};
