//! HTTP transport for the OneView management API
//!
//! Every management API call, login included, goes through [`RetryingClient`]:
//! up to three retries with exponential backoff when the appliance answers
//! 500/502/503/504 or the connection fails.

use std::time::Duration;

use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::config::OneViewConfig;
use crate::error::{Error, Result};

/// Retry schedule for management API calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base of the exponential backoff
    pub backoff_factor: Duration,
    /// Response statuses that are retried
    pub status_forcelist: &'static [u16],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_secs(1),
            status_forcelist: &[500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based): nothing for the first, then
    /// `factor * 2^(retry - 1)`
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        self.backoff_factor * 2u32.saturating_pow(retry - 1)
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }

    fn retries_error(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }
}

/// A reqwest client that re-sends requests according to a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Wrap an existing client
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Build a client for the configured appliance (timeouts and TLS trust)
    pub fn for_oneview(config: &OneViewConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(20);

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| Error::config(format!("invalid CA certificate {path}: {e}")))?;
            builder = builder.add_root_certificate(cert);
        } else if !config.ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build OneView HTTP client: {e}")))?;

        Ok(Self::new(client, RetryPolicy::default()))
    }

    /// Send the request produced by `build`, rebuilding it for each retry.
    ///
    /// When retries run out the last response or error is returned as-is.
    pub async fn send<F>(&self, build: F) -> std::result::Result<Response, reqwest::Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retry = 0;

        loop {
            let result = build(&self.client).send().await;

            let retryable = match &result {
                Ok(response) => self.policy.retries_status(response.status()),
                Err(err) => RetryPolicy::retries_error(err),
            };

            if !retryable || retry >= self.policy.max_retries {
                return result;
            }

            retry += 1;
            let delay = self.policy.backoff(retry);

            match &result {
                Ok(response) => warn!(
                    status = %response.status(),
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying OneView request"
                ),
                Err(err) => warn!(
                    error = %err,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying OneView request"
                ),
            }

            tokio::time::sleep(delay).await;
        }
    }
}
