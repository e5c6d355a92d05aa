//! Critical alert retrieval from OneView

use std::sync::Arc;
use std::time::Instant;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Alert, RawAlert};

use super::session::SessionManager;

/// Default `X-API-Version` header value
pub const DEFAULT_API_VERSION: &str = "4600";

#[derive(Deserialize)]
struct AlertList {
    #[serde(default)]
    members: Vec<RawAlert>,
}

/// Fetches critical alerts and normalizes them into [`Alert`]s
pub struct AlertSource {
    sessions: Arc<SessionManager>,
    api_version: String,
}

impl AlertSource {
    /// Create an alert source on top of a session manager
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Override the `X-API-Version` header
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// The session manager used for authentication
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Fetch critical alerts, newest first.
    ///
    /// Never fails: authentication and transport problems are logged and
    /// yield an empty list, so a bad fetch only costs one poll cycle.
    pub async fn fetch_critical_alerts(&self) -> Vec<Alert> {
        match self.try_fetch().await {
            Ok(alerts) => {
                info!(count = alerts.len(), "Retrieved critical alerts from OneView");
                alerts
            }
            Err(e) => {
                error!(error = %e, "Error fetching alerts from OneView");
                Vec::new()
            }
        }
    }

    /// Log in afresh and count the current critical alerts
    pub async fn test_connection(&self) -> Result<usize> {
        if !self.sessions.authenticate().await {
            return Err(Error::auth("Failed to authenticate with OneView"));
        }
        Ok(self.try_fetch().await?.len())
    }

    async fn try_fetch(&self) -> Result<Vec<Alert>> {
        let token = self.sessions.get_valid_token().await?;
        let base_url = self
            .sessions
            .base_url()
            .ok_or_else(|| Error::config("OneView host not configured"))?;
        let url = format!("{base_url}/rest/alerts");

        let started = Instant::now();
        let response = self
            .sessions
            .http()
            .send(|c| {
                c.get(&url)
                    .header("Auth", &token)
                    .header("X-API-Version", &self.api_version)
                    .query(&[("filter", "severity='Critical'"), ("sort", "created:desc")])
            })
            .await;
        metrics::histogram!("oneview_api_latency_seconds", "endpoint" => "get_alerts")
            .record(started.elapsed().as_secs_f64());

        let response = response?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && self.sessions.invalidate_token(&token) {
            warn!("OneView rejected the session token, dropping session");
        }

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "Failed to fetch alerts");
            return Err(Error::unexpected_status("/rest/alerts", status.as_u16()));
        }

        let list: AlertList = response.json().await?;
        Ok(list.members.into_iter().map(Alert::from_raw).collect())
    }
}
