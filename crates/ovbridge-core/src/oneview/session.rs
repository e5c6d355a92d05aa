//! OneView login session lifecycle

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::OneViewConfig;
use crate::error::{Error, Result};
use crate::models::Session;

use super::transport::RetryingClient;

/// Hours a fresh session is used before logging in again. OneView itself
/// issues 24 hour sessions.
pub const SESSION_LIFETIME_HOURS: i64 = 22;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
}

/// Owns the OneView credentials and the current session.
///
/// The session is an immutable [`Session`] behind a lock; readers take the
/// `Arc`, re-authentication swaps in a new one. Concurrent callers that find
/// the session expired queue on a single login.
pub struct SessionManager {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    http: RetryingClient,
    clock: Arc<dyn Clock>,
    session: RwLock<Arc<Session>>,
    auth_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create a session manager for an appliance at `base_url`
    pub fn new(
        base_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        http: RetryingClient,
    ) -> Self {
        Self {
            base_url,
            username,
            password,
            http,
            clock: Arc::new(SystemClock),
            session: RwLock::new(Arc::new(Session::empty())),
            auth_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a session manager from configuration
    pub fn from_config(config: &OneViewConfig, http: RetryingClient) -> Self {
        Self::new(
            config.base_url(),
            config.username.clone(),
            config.password.clone(),
            http,
        )
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Host, username and password are all present
    pub fn is_configured(&self) -> bool {
        [&self.base_url, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Point-in-time copy of the current session
    pub fn snapshot(&self) -> Arc<Session> {
        self.session.read().clone()
    }

    /// Whether the current session can be used right now. No network call.
    pub fn is_valid(&self) -> bool {
        self.snapshot().is_valid_at(self.clock.now())
    }

    /// Drop the current session so the next call logs in again
    pub fn invalidate(&self) {
        self.install(Session::empty());
        metrics::gauge!("oneview_session_active").set(0.0);
    }

    /// Drop the session only while it still holds `rejected`. A session
    /// installed by a concurrent login is kept. Returns whether one was dropped.
    pub fn invalidate_token(&self, rejected: &str) -> bool {
        {
            let mut session = self.session.write();
            if session.token() != Some(rejected) {
                return false;
            }
            *session = Arc::new(Session::empty());
        }
        metrics::gauge!("oneview_session_active").set(0.0);
        true
    }

    /// Return a usable token, logging in first if the session is missing or expired
    pub async fn get_valid_token(&self) -> Result<String> {
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        if !self.is_configured() {
            return Err(Error::config("OneView credentials not properly configured"));
        }

        let _guard = self.auth_lock.lock().await;

        // Another caller may have logged in while we waited
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        self.refresh().await.map_err(|e| match e {
            Error::Config(_) | Error::Auth(_) => e,
            other => Error::auth(other.to_string()),
        })
    }

    /// Log in unconditionally. Failures are logged and reported as `false`.
    pub async fn authenticate(&self) -> bool {
        if !self.is_configured() {
            error!("OneView credentials not properly configured");
            self.invalidate();
            return false;
        }

        let _guard = self.auth_lock.lock().await;
        self.refresh().await.is_ok()
    }

    pub(crate) fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub(crate) fn http(&self) -> &RetryingClient {
        &self.http
    }

    fn valid_token(&self) -> Option<String> {
        let session = self.snapshot();
        if session.is_valid_at(self.clock.now()) {
            session.token().map(str::to_string)
        } else {
            None
        }
    }

    fn install(&self, session: Session) {
        *self.session.write() = Arc::new(session);
    }

    /// Perform the login and install the resulting session. Caller holds `auth_lock`.
    async fn refresh(&self) -> Result<String> {
        let started = Instant::now();
        let result = self.login().await;
        metrics::histogram!("oneview_auth_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(session) => {
                let token = session.token().unwrap_or_default().to_string();
                debug!(expires_at = ?session.expires_at(), "Installed new OneView session");
                self.install(session);
                metrics::gauge!("oneview_session_active").set(1.0);
                info!("Successfully authenticated with OneView");
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "OneView authentication failed");
                self.invalidate();
                Err(e)
            }
        }
    }

    async fn login(&self) -> Result<Session> {
        let (Some(base_url), Some(username), Some(password)) =
            (&self.base_url, &self.username, &self.password)
        else {
            return Err(Error::config("OneView credentials not properly configured"));
        };

        let url = format!("{base_url}/rest/login-sessions");
        let body = LoginRequest {
            user_name: username,
            password,
        };

        let response = self.http.send(|c| c.post(&url).json(&body)).await?;
        let status = response.status();

        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("HTTP {status}: {text}")));
        }

        let login: LoginResponse = response.json().await?;
        let token = login
            .session_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth("login response did not include a sessionID"))?;

        let expires_at = self.clock.now() + chrono::Duration::hours(SESSION_LIFETIME_HOURS);
        Ok(Session::new(token, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::oneview::transport::RetryPolicy;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer, clock: Arc<ManualClock>) -> SessionManager {
        let http = RetryingClient::new(
            reqwest::Client::new(),
            RetryPolicy {
                backoff_factor: std::time::Duration::from_millis(1),
                ..RetryPolicy::default()
            },
        );
        SessionManager::new(
            Some(server.uri()),
            Some("admin".to_string()),
            Some("secret".to_string()),
            http,
        )
        .with_clock(clock)
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/rest/login-sessions"))
            .and(body_json(json!({ "userName": "admin", "password": "secret" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sessionID": "tok-1" })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_session_expires_after_22_hours() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = manager(&server, clock.clone());

        assert!(!sessions.is_valid());
        assert!(sessions.authenticate().await);
        assert!(sessions.is_valid());

        clock.advance(Duration::hours(22) + Duration::minutes(1));
        assert!(!sessions.is_valid());
    }

    #[tokio::test]
    async fn test_token_is_reused_while_valid() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        let sessions = manager(&server, Arc::new(ManualClock::new(Utc::now())));

        assert_eq!(sessions.get_valid_token().await.unwrap(), "tok-1");
        assert_eq!(sessions.get_valid_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_expired_session_reauthenticates() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = manager(&server, clock.clone());

        sessions.get_valid_token().await.unwrap();
        clock.advance(Duration::hours(23));
        sessions.get_valid_token().await.unwrap();
        assert!(sessions.is_valid());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_login() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        let sessions = Arc::new(manager(&server, Arc::new(ManualClock::new(Utc::now()))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_valid_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/login-sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .expect(2)
            .mount(&server)
            .await;

        let sessions = manager(&server, Arc::new(ManualClock::new(Utc::now())));

        assert!(!sessions.authenticate().await);
        assert!(!sessions.is_valid());
        assert!(matches!(sessions.get_valid_token().await, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_stale_token_keeps_newer_session() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        let sessions = manager(&server, Arc::new(ManualClock::new(Utc::now())));
        assert!(sessions.authenticate().await);

        assert!(!sessions.invalidate_token("tok-0"));
        assert!(sessions.is_valid());

        assert!(sessions.invalidate_token("tok-1"));
        assert!(!sessions.is_valid());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let sessions = SessionManager::new(
            Some("https://oneview.invalid".to_string()),
            Some("admin".to_string()),
            None,
            RetryingClient::new(reqwest::Client::new(), RetryPolicy::default()),
        );

        assert!(!sessions.is_configured());
        assert!(!sessions.authenticate().await);
        assert!(matches!(sessions.get_valid_token().await, Err(Error::Config(_))));
    }
}
