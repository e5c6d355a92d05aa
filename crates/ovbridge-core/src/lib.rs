//! # OVBridge
//!
//! Forwards HPE OneView critical alerts to PagerDuty.
//!
//! Alerts arrive two ways: a background poller that pulls critical alerts
//! from the OneView REST API, and a webhook OneView can push to. Both feed
//! the same claim-then-deliver path, so each alert identity produces at
//! most one PagerDuty event.
//!
//! ## Architecture
//!
//! - **OneView**: session management and critical alert retrieval
//! - **Alerting**: dedup cache, PagerDuty delivery, and the poll loop
//! - **API**: probes, webhook intake, manual poll, Prometheus metrics
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the HTTP surface and the poller
//! ovbridge serve
//!
//! # Verify OneView credentials
//! ovbridge check
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod oneview;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertProcessor, DedupCache, DeliveryClient, Poller};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::oneview::{AlertSource, SessionManager};
}
