//! Delivery of alerts to PagerDuty (Events API v2)

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::PagerDutyConfig;
use crate::error::{Error, Result};
use crate::models::{Alert, AlertState};

/// PagerDuty event action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// Open (or re-open) an incident
    Trigger,
    /// Close the incident with the same dedup key
    Resolve,
}

impl EventAction {
    /// The action an alert in `state` requires, if any
    pub fn for_state(state: &AlertState) -> Option<Self> {
        match state {
            AlertState::Active => Some(Self::Trigger),
            AlertState::Cleared | AlertState::Acknowledged => Some(Self::Resolve),
            AlertState::Other(_) => None,
        }
    }
}

/// Why a delivery did not go through
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("PagerDuty routing key not configured")]
    NoRoutingKey,

    #[error("PagerDuty returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Transport(String),
}

impl DeliveryFailure {
    /// Label used on the failure counter
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoRoutingKey => "no_routing_key",
            Self::Rejected { .. } => "pagerduty_api_error",
            Self::Transport(_) => "exception",
        }
    }
}

/// Result of a single delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// PagerDuty accepted the event
    Sent(EventAction),
    /// The alert state needs no action; nothing was sent
    Skipped,
    /// The event was not accepted
    Failed(DeliveryFailure),
}

impl DeliveryOutcome {
    /// Sent or skipped
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Sends canonical alerts to the PagerDuty events endpoint
pub struct DeliveryClient {
    client: Client,
    events_url: String,
}

impl DeliveryClient {
    /// Create a delivery client
    pub fn new(config: &PagerDutyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build PagerDuty HTTP client: {e}")))?;

        Ok(Self {
            client,
            events_url: config.events_url.clone(),
        })
    }

    /// Deliver `alert` with `routing_key`.
    ///
    /// A missing routing key fails without any outbound call, and so does a
    /// state that maps to no event action (reported as skipped).
    pub async fn deliver(&self, alert: &Alert, routing_key: Option<&str>) -> DeliveryOutcome {
        let Some(routing_key) = routing_key.filter(|k| !k.is_empty()) else {
            error!(alert_id = %alert.identity, "PagerDuty routing key not configured");
            return failed(DeliveryFailure::NoRoutingKey);
        };

        let Some(action) = EventAction::for_state(&alert.state) else {
            debug!(alert_id = %alert.identity, state = %alert.state, "No PagerDuty action for alert state");
            return DeliveryOutcome::Skipped;
        };

        let event = build_event(alert, routing_key, action);

        metrics::counter!("pagerduty_delivery_attempts_total").increment(1);
        let started = Instant::now();

        let response = self.client.post(&self.events_url).json(&event).send().await;

        metrics::histogram!("alert_delivery_duration_seconds").record(started.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(alert_id = %alert.identity, error = %e, "Error sending to PagerDuty");
                return failed(DeliveryFailure::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            error!(
                alert_id = %alert.identity,
                resource = %alert.resource_name,
                %status,
                body = %body,
                "PagerDuty API error"
            );
            return failed(DeliveryFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        metrics::counter!("pagerduty_alerts_sent_total").increment(1);
        info!(
            alert_id = %alert.identity,
            resource = %alert.resource_name,
            action = ?action,
            "Sent alert to PagerDuty"
        );
        DeliveryOutcome::Sent(action)
    }
}

fn failed(failure: DeliveryFailure) -> DeliveryOutcome {
    record_failure(&failure);
    DeliveryOutcome::Failed(failure)
}

/// Count a delivery that did not go through, labelled by reason
pub(crate) fn record_failure(failure: &DeliveryFailure) {
    metrics::counter!("pagerduty_alerts_failed_total", "reason" => failure.reason()).increment(1);
}

/// Build the Events v2 body for `alert`
pub(crate) fn build_event(alert: &Alert, routing_key: &str, action: EventAction) -> PagerDutyEvent {
    PagerDutyEvent {
        routing_key: routing_key.to_string(),
        event_action: action,
        dedup_key: alert.identity.clone(),
        payload: PagerDutyEventPayload {
            summary: format!(
                "OneView Alert: {} - Resource: {}",
                alert.description, alert.resource_name
            ),
            severity: alert.severity.to_lowercase(),
            source: alert.source.clone(),
            timestamp: alert
                .created_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            component: alert.resource_name.clone(),
            group: alert.resource_category.clone(),
            class: alert.alert_type.clone().unwrap_or_else(|| "Alert".to_string()),
            custom_details: CustomDetails {
                oneview_alert_id: alert.identity.clone(),
                resource_name: alert.resource_name.clone(),
                resource_category: alert.resource_category.clone(),
                alert_type: alert.alert_type.clone(),
                description: alert.description.clone(),
                created: alert.created_at.clone(),
                modified: alert.modified_at.clone(),
                severity: alert.severity.clone(),
                health_category: alert.health_category.clone(),
                urgency: alert.urgency.clone(),
            },
        },
    }
}

// PagerDuty payload types
#[derive(Debug, Serialize)]
pub(crate) struct PagerDutyEvent {
    routing_key: String,
    event_action: EventAction,
    dedup_key: String,
    payload: PagerDutyEventPayload,
}

#[derive(Debug, Serialize)]
struct PagerDutyEventPayload {
    summary: String,
    severity: String,
    source: String,
    timestamp: String,
    component: String,
    group: String,
    class: String,
    custom_details: CustomDetails,
}

#[derive(Debug, Serialize)]
struct CustomDetails {
    oneview_alert_id: String,
    resource_name: String,
    resource_category: String,
    alert_type: Option<String>,
    description: String,
    created: Option<String>,
    modified: Option<String>,
    severity: String,
    health_category: Option<String>,
    urgency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DeliveryClient {
        DeliveryClient::new(&PagerDutyConfig {
            events_url: format!("{}/v2/enqueue", server.uri()),
            ..PagerDutyConfig::default()
        })
        .unwrap()
    }

    fn alert(state: &str) -> Alert {
        Alert::from_value(json!({
            "uri": "/rest/alerts/42",
            "description": "Power supply failure",
            "severity": "Critical",
            "alertState": state,
            "created": "2024-03-01T10:00:00.000Z",
            "modified": "2024-03-01T10:05:00.000Z",
            "alertTypeID": "Trap.cpqHe3FltTolPowerSupplyDegraded",
            "healthCategory": "Power",
            "urgency": "Critical",
            "resourceUri": "/rest/server-hardware/ABC",
            "associatedResource": {
                "resourceName": "Blade-7",
                "resourceCategory": "server-hardware"
            }
        }))
        .unwrap()
    }

    #[rstest]
    #[case("Active", Some(EventAction::Trigger))]
    #[case("Cleared", Some(EventAction::Resolve))]
    #[case("Acknowledged", Some(EventAction::Resolve))]
    #[case("Informational", None)]
    fn test_state_mapping(#[case] state: &str, #[case] expected: Option<EventAction>) {
        assert_eq!(EventAction::for_state(&AlertState::parse(state)), expected);
    }

    #[test]
    fn test_event_body() {
        let event = build_event(&alert("Active"), "R0UT1NG", EventAction::Trigger);

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "routing_key": "R0UT1NG",
                "event_action": "trigger",
                "dedup_key": "/rest/alerts/42",
                "payload": {
                    "summary": "OneView Alert: Power supply failure - Resource: Blade-7",
                    "severity": "critical",
                    "source": "/rest/server-hardware/ABC",
                    "timestamp": "2024-03-01T10:00:00.000Z",
                    "component": "Blade-7",
                    "group": "server-hardware",
                    "class": "Trap.cpqHe3FltTolPowerSupplyDegraded",
                    "custom_details": {
                        "oneview_alert_id": "/rest/alerts/42",
                        "resource_name": "Blade-7",
                        "resource_category": "server-hardware",
                        "alert_type": "Trap.cpqHe3FltTolPowerSupplyDegraded",
                        "description": "Power supply failure",
                        "created": "2024-03-01T10:00:00.000Z",
                        "modified": "2024-03-01T10:05:00.000Z",
                        "severity": "Critical",
                        "health_category": "Power",
                        "urgency": "Critical"
                    }
                }
            })
        );
    }

    #[rstest]
    #[case("Active", "trigger")]
    #[case("Cleared", "resolve")]
    #[case("Acknowledged", "resolve")]
    #[tokio::test]
    async fn test_deliver_posts_event(#[case] state: &str, #[case] action: &str) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server).deliver(&alert(state), Some("R0UT1NG")).await;
        assert!(outcome.is_success());

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["event_action"], action);
        assert_eq!(body["dedup_key"], "/rest/alerts/42");
    }

    #[tokio::test]
    async fn test_unrecognized_state_is_skipped_without_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client(&server).deliver(&alert("Informational"), Some("R0UT1NG")).await;

        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_missing_routing_key_fails_without_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client(&server).deliver(&alert("Active"), None).await;

        assert_eq!(outcome, DeliveryOutcome::Failed(DeliveryFailure::NoRoutingKey));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_rejected_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid routing key"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server).deliver(&alert("Active"), Some("bad")).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(DeliveryFailure::Rejected {
                status: 400,
                body: "Invalid routing key".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // Nothing listens on a port we bound and released
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = DeliveryClient::new(&PagerDutyConfig {
            events_url: format!("http://127.0.0.1:{port}/v2/enqueue"),
            ..PagerDutyConfig::default()
        })
        .unwrap();

        let outcome = client.deliver(&alert("Active"), Some("R0UT1NG")).await;

        match outcome {
            DeliveryOutcome::Failed(failure) => assert_eq!(failure.reason(), "exception"),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
