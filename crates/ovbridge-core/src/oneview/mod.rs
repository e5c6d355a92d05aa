//! HPE OneView management API client
//!
//! Session handling, the retrying transport, and critical alert retrieval.

mod session;
mod source;
mod transport;

pub use session::{SessionManager, SESSION_LIFETIME_HOURS};
pub use source::{AlertSource, DEFAULT_API_VERSION};
pub use transport::{RetryPolicy, RetryingClient};

use std::sync::Arc;

use crate::config::OneViewConfig;
use crate::error::Result;

/// Build the alert source for the configured appliance.
///
/// Returns `None` when host, username or password is missing.
pub fn connect(config: &OneViewConfig) -> Result<Option<Arc<AlertSource>>> {
    if !config.is_complete() {
        return Ok(None);
    }

    let http = RetryingClient::for_oneview(config)?;
    let sessions = Arc::new(SessionManager::from_config(config, http));
    let source = AlertSource::new(sessions).with_api_version(config.api_version.clone());

    Ok(Some(Arc::new(source)))
}
