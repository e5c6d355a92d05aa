//! Configuration management for OVBridge
//!
//! Values are layered: built-in defaults, an optional TOML/YAML file,
//! `OVBRIDGE__SECTION__KEY` environment variables, and finally the flat
//! variable names used by existing deployments (`ONEVIEW_HOST`,
//! `PAGERDUTY_ROUTING_KEY`, `POLL_INTERVAL`, ...). Everything is read once at
//! startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default PagerDuty Events v2 ingestion endpoint
pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Upper bound for dedup retention (one year)
pub const MAX_DEDUP_TTL_HOURS: u64 = 24 * 365;

/// Flat environment variables accepted for compatibility, mapped to config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("ONEVIEW_HOST", "oneview.host"),
    ("ONEVIEW_USERNAME", "oneview.username"),
    ("ONEVIEW_PASSWORD", "oneview.password"),
    ("ONEVIEW_SSL_VERIFY", "oneview.ssl_verify"),
    ("ONEVIEW_CACERT", "oneview.ca_cert"),
    ("PAGERDUTY_ROUTING_KEY", "pagerduty.routing_key"),
    ("POLL_INTERVAL", "poller.interval_secs"),
    ("PORT", "server.port"),
    ("LOG_LEVEL", "logging.level"),
];

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// OneView management API configuration
    pub oneview: OneViewConfig,

    /// PagerDuty delivery configuration
    pub pagerduty: PagerDutyConfig,

    /// Background poller configuration
    pub poller: PollerConfig,

    /// Health reporting configuration
    pub health: HealthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional file and the process environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load configuration from an optional file and an explicit environment map
    pub fn load_with_env(path: Option<&str>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("OVBRIDGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_ENV {
            if let Some(value) = env.get(*var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value.as_str())?;
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the poller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            return Err(Error::config("poller.interval_secs must be at least 1"));
        }
        if self.poller.dedup_ttl_hours == 0 || self.poller.dedup_ttl_hours > MAX_DEDUP_TTL_HOURS {
            return Err(Error::config(format!(
                "poller.dedup_ttl_hours must be between 1 and {MAX_DEDUP_TTL_HOURS}"
            )));
        }
        Ok(())
    }

    /// Whether both the OneView credentials and the PagerDuty routing key are present
    pub fn is_ready(&self) -> bool {
        self.oneview.is_complete()
            && self
                .pagerduty
                .routing_key
                .as_deref()
                .is_some_and(|k| !k.is_empty())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// OneView management API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneViewConfig {
    /// Appliance host, with or without a scheme
    pub host: Option<String>,
    /// Login user
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Verify the appliance certificate
    pub ssl_verify: bool,
    /// PEM bundle to trust instead of the system roots
    pub ca_cert: Option<String>,
    /// Value sent in the X-API-Version header
    pub api_version: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OneViewConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            ssl_verify: false,
            ca_cert: None,
            api_version: "4600".to_string(),
            timeout_secs: 30,
        }
    }
}

impl OneViewConfig {
    /// All three of host, username and password are set and non-empty
    pub fn is_complete(&self) -> bool {
        [&self.host, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// The appliance base URL, always `https://<host>`
    pub fn base_url(&self) -> Option<String> {
        self.host
            .as_deref()
            .map(normalize_host)
            .filter(|h| !h.is_empty())
            .map(|h| format!("https://{h}"))
    }
}

/// Strip any scheme and trailing slash from a configured host
fn normalize_host(host: &str) -> &str {
    let host = host.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.trim_end_matches('/')
}

/// PagerDuty delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    /// Events v2 integration routing key
    pub routing_key: Option<String>,
    /// Enqueue endpoint
    pub events_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            routing_key: None,
            events_url: PAGERDUTY_EVENTS_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Background poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Run the poll loop in this process
    pub enabled: bool,
    /// Seconds between poll cycles
    pub interval_secs: u64,
    /// How long a delivered identity is remembered
    pub dedup_ttl_hours: u64,
}

impl PollerConfig {
    /// Wait between poll cycles
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Dedup retention. Values above [`MAX_DEDUP_TTL_HOURS`] are clamped.
    pub fn dedup_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.dedup_ttl_hours.min(MAX_DEDUP_TTL_HOURS) as i64)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 180,
            dedup_ttl_hours: 24,
        }
    }
}

/// Health reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Health URL of the poller instance, queried when this one does not poll
    pub poller_url: Option<String>,
    /// Peer query timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poller_url: None,
            timeout_secs: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
