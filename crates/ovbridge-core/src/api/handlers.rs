//! API handlers for the bridge HTTP surface

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerting::{AlertProcessor, ProcessOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Alert;
use crate::oneview::AlertSource;

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub source: Option<Arc<AlertSource>>,
    pub processor: Arc<AlertProcessor>,
    pub metrics: Option<PrometheusHandle>,
    /// Whether this process runs the poll loop
    pub polling_enabled: bool,
    pub shutdown: CancellationToken,
    peer: reqwest::Client,
}

impl AppState {
    /// Create handler state. The peer client uses the health query timeout.
    pub fn new(
        config: Arc<Config>,
        source: Option<Arc<AlertSource>>,
        processor: Arc<AlertProcessor>,
        metrics: Option<PrometheusHandle>,
        polling_enabled: bool,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let peer = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.health.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build peer HTTP client: {e}")))?;

        Ok(Self {
            config,
            source,
            processor,
            metrics,
            polling_enabled,
            shutdown,
            peer,
        })
    }

    fn session_valid(&self) -> Option<bool> {
        self.source.as_ref().map(|s| s.sessions().is_valid())
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub oneview_configured: bool,
    pub pagerduty_configured: bool,
    pub poll_interval: u64,
    pub polling_enabled: bool,
    pub processed_alerts_count: usize,
    pub timestamp: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneview_session_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poller_status: Option<PollerStatus>,
}

/// Health of the polling instance as seen from a web-only instance
#[derive(Debug, Default, Serialize)]
pub struct PollerStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneview_session_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_alerts_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_timestamp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollerStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Json<HealthResponse> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("N/A")
        .to_string();

    let mut response = HealthResponse {
        status: "healthy",
        oneview_configured: state.source.is_some(),
        pagerduty_configured: state.processor.is_configured(),
        poll_interval: state.config.poller.interval_secs,
        polling_enabled: state.polling_enabled,
        processed_alerts_count: state.processor.dedup().size(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        request_id,
        oneview_session_valid: state.session_valid(),
        poller_status: None,
    };

    if !state.polling_enabled {
        if let Some(url) = state.config.health.poller_url.as_deref() {
            let status = query_poller(&state.peer, url).await;
            response.oneview_session_valid = Some(status.oneview_session_valid.unwrap_or(false));
            response.poller_status = Some(status);
        }
    }

    Json(response)
}

async fn query_poller(client: &reqwest::Client, url: &str) -> PollerStatus {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!(%url, "Timed out querying poller health");
            return PollerStatus::unhealthy("Timeout connecting to poller pod");
        }
        Err(e) if e.is_connect() => {
            warn!(%url, error = %e, "Could not reach poller");
            return PollerStatus::unhealthy(format!("Connection error: {e}"));
        }
        Err(e) => return PollerStatus::unhealthy(format!("Unexpected error: {e}")),
    };

    let status = response.status().as_u16();
    if status != 200 {
        return PollerStatus::unhealthy(format!("Poller returned HTTP {status}"));
    }

    match response.json::<Value>().await {
        Ok(data) => PollerStatus {
            healthy: true,
            oneview_session_valid: Some(data["oneview_session_valid"].as_bool().unwrap_or(false)),
            processed_alerts_count: Some(data["processed_alerts_count"].as_u64().unwrap_or(0)),
            last_check_timestamp: data.get("timestamp").cloned(),
            polling_enabled: Some(data["polling_enabled"].as_bool().unwrap_or(false)),
            error: None,
        },
        Err(e) => PollerStatus::unhealthy(format!("Unexpected error: {e}")),
    }
}

/// Readiness check: both OneView and PagerDuty must be configured
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if !state.config.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "reason": "missing configuration" })),
        );
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Accept one alert pushed by OneView
pub async fn oneview_webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let Some(alert) = parse_webhook(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No JSON data received" })),
        );
    };

    match state.processor.process(&alert).await {
        ProcessOutcome::AlreadyProcessed => {
            info!(alert_id = %alert.identity, "Alert already processed, skipping");
            (
                StatusCode::OK,
                Json(json!({ "status": "already_processed", "alert_id": alert.identity })),
            )
        }
        ProcessOutcome::Processed(_) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "message": "Alert sent to PagerDuty" })),
        ),
        ProcessOutcome::Failed(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": "Failed to send to PagerDuty",
                "reason": failure.reason(),
            })),
        ),
    }
}

/// A non-empty JSON object, normalized. Anything else is treated as no data.
fn parse_webhook(body: &[u8]) -> Option<Alert> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(map) if !map.is_empty() => Some(Alert::from_raw(map)),
        _ => None,
    }
}

/// Run one fetch, claim and deliver pass on demand
pub async fn force_poll(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(source) = state.source.as_ref() else {
        return not_configured();
    };

    let alerts = source.fetch_critical_alerts().await;
    let report = state.processor.process_all(&alerts, &state.shutdown).await;
    info!(
        found = report.found,
        processed = report.processed,
        "Manual poll complete"
    );

    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "alerts_found": report.found,
            "alerts_processed": report.processed,
        })),
    )
}

/// Log in afresh and count critical alerts
pub async fn test_connection(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(source) = state.source.as_ref() else {
        return not_configured();
    };

    match source.test_connection().await {
        Ok(count) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Successfully connected to OneView",
                "critical_alerts_count": count,
            })),
        ),
        Err(Error::Auth(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to authenticate with OneView" })),
        ),
        Err(e) => {
            error!(error = %e, "OneView connection test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Connection test failed: {e}") })),
            )
        }
    }
}

fn not_configured() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "OneView client not configured" })),
    )
}

/// Prometheus exposition. Point-in-time gauges are refreshed first.
pub async fn render_metrics(State(state): State<AppState>) -> Response {
    metrics::gauge!("processed_alerts_count").set(state.processor.dedup().size() as f64);
    let session_active = state.session_valid().unwrap_or(false);
    metrics::gauge!("oneview_session_active").set(if session_active { 1.0 } else { 0.0 });

    match state.metrics.as_ref() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}
