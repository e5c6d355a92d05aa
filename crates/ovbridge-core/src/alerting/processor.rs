//! Claim-then-deliver sequence shared by the poller, the webhook and manual polls

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::Alert;

use super::dedup::DedupCache;
use super::notifier::{record_failure, DeliveryClient, DeliveryFailure, DeliveryOutcome};

/// What happened to one alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// This caller claimed the identity and delivery succeeded (sent or skipped)
    Processed(DeliveryOutcome),
    /// The identity was already claimed; nothing was sent
    AlreadyProcessed,
    /// Delivery failed. Unless the failure is a missing routing key, the
    /// identity stays claimed and the alert is not retried.
    Failed(DeliveryFailure),
}

/// Counts from processing a list of alerts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Alerts handed in
    pub found: usize,
    /// Alerts newly claimed and delivered
    pub processed: usize,
    /// Alerts skipped because they were already claimed
    pub duplicates: usize,
    /// Alerts whose delivery failed
    pub failed: usize,
}

/// Runs claim -> deliver for every entry point.
///
/// The claim happens before delivery, so each identity gets at most one
/// delivery attempt no matter how many producers race for it.
pub struct AlertProcessor {
    dedup: Arc<DedupCache>,
    delivery: DeliveryClient,
    routing_key: Option<String>,
    processed: AtomicU64,
}

impl AlertProcessor {
    /// Create a processor
    pub fn new(dedup: Arc<DedupCache>, delivery: DeliveryClient, routing_key: Option<String>) -> Self {
        Self {
            dedup,
            delivery,
            routing_key: routing_key.filter(|k| !k.is_empty()),
            processed: AtomicU64::new(0),
        }
    }

    /// The shared dedup cache
    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Whether a routing key is configured
    pub fn is_configured(&self) -> bool {
        self.routing_key.is_some()
    }

    /// Alerts processed by this instance since startup
    pub fn processed_total(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Claim `alert` and, if this caller won the claim, deliver it
    pub async fn process(&self, alert: &Alert) -> ProcessOutcome {
        // Missing routing key is reported without claiming
        if self.routing_key.is_none() {
            error!(alert_id = %alert.identity, "PagerDuty routing key not configured");
            let failure = DeliveryFailure::NoRoutingKey;
            record_failure(&failure);
            return ProcessOutcome::Failed(failure);
        }

        if !self.dedup.try_claim(&alert.identity) {
            debug!(alert_id = %alert.identity, "Alert already processed, skipping");
            return ProcessOutcome::AlreadyProcessed;
        }

        match self.delivery.deliver(alert, self.routing_key.as_deref()).await {
            DeliveryOutcome::Failed(failure) => {
                warn!(
                    alert_id = %alert.identity,
                    reason = failure.reason(),
                    "Delivery failed; alert stays claimed"
                );
                ProcessOutcome::Failed(failure)
            }
            outcome => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("oneview_alerts_processed_total").increment(1);
                ProcessOutcome::Processed(outcome)
            }
        }
    }

    /// Process `alerts` in order, stopping early if `cancel` fires
    pub async fn process_all(&self, alerts: &[Alert], cancel: &CancellationToken) -> BatchReport {
        let mut report = BatchReport {
            found: alerts.len(),
            ..BatchReport::default()
        };

        for alert in alerts {
            if cancel.is_cancelled() {
                info!("Shutdown requested, stopping alert processing");
                break;
            }

            match self.process(alert).await {
                ProcessOutcome::Processed(_) => report.processed += 1,
                ProcessOutcome::AlreadyProcessed => report.duplicates += 1,
                ProcessOutcome::Failed(_) => report.failed += 1,
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PagerDutyConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn processor(server: &MockServer, routing_key: Option<&str>) -> AlertProcessor {
        let delivery = DeliveryClient::new(&PagerDutyConfig {
            events_url: format!("{}/v2/enqueue", server.uri()),
            ..PagerDutyConfig::default()
        })
        .unwrap();
        AlertProcessor::new(
            Arc::new(DedupCache::new()),
            delivery,
            routing_key.map(str::to_string),
        )
    }

    fn alert(uri: &str) -> Alert {
        Alert::from_value(json!({
            "uri": uri,
            "alertState": "Active",
            "description": "Fan failure",
            "severity": "Critical"
        }))
        .unwrap()
    }

    async fn mount_pagerduty(server: &MockServer, status: u16, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .respond_with(ResponseTemplate::new(status))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_paths_deliver_once() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 202, 1).await;

        let processor = Arc::new(processor(&server, Some("R0UT1NG")));

        // One copy as the poller sees it, one as the webhook receives it
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let processor = processor.clone();
                let alert = alert("/rest/alerts/7");
                tokio::spawn(async move { processor.process(&alert).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, ProcessOutcome::Processed(_)))
                .count(),
            1
        );
        assert!(outcomes.contains(&ProcessOutcome::AlreadyProcessed));
        assert_eq!(processor.processed_total(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_retried() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 500, 1).await;

        let processor = processor(&server, Some("R0UT1NG"));
        let alert = alert("/rest/alerts/8");

        assert!(matches!(processor.process(&alert).await, ProcessOutcome::Failed(_)));
        assert_eq!(processor.process(&alert).await, ProcessOutcome::AlreadyProcessed);
        assert_eq!(processor.processed_total(), 0);
    }

    #[tokio::test]
    async fn test_missing_routing_key_does_not_claim() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 202, 0).await;

        let processor = processor(&server, None);
        let alert = alert("/rest/alerts/9");

        assert_eq!(
            processor.process(&alert).await,
            ProcessOutcome::Failed(DeliveryFailure::NoRoutingKey)
        );
        assert!(!processor.dedup().contains("/rest/alerts/9"));
    }

    #[tokio::test]
    async fn test_missing_routing_key_is_counted() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 202, 0).await;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = metrics::set_default_local_recorder(&recorder);

        let processor = processor(&server, None);
        processor.process(&alert("/rest/alerts/10")).await;
        processor.process(&alert("/rest/alerts/11")).await;

        let rendered = handle.render();
        assert!(
            rendered.contains(r#"pagerduty_alerts_failed_total{reason="no_routing_key"} 2"#),
            "{rendered}"
        );
    }

    #[tokio::test]
    async fn test_batch_report() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 202, 2).await;

        let processor = processor(&server, Some("R0UT1NG"));
        let alerts = vec![alert("/rest/alerts/1"), alert("/rest/alerts/2"), alert("/rest/alerts/1")];

        let report = processor.process_all(&alerts, &CancellationToken::new()).await;

        assert_eq!(
            report,
            BatchReport {
                found: 3,
                processed: 2,
                duplicates: 1,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_batch_stops_when_cancelled() {
        let server = MockServer::start().await;
        mount_pagerduty(&server, 202, 0).await;

        let processor = processor(&server, Some("R0UT1NG"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = processor
            .process_all(&[alert("/rest/alerts/1")], &cancel)
            .await;

        assert_eq!(report.processed, 0);
        assert_eq!(processor.dedup().size(), 0);
    }
}
