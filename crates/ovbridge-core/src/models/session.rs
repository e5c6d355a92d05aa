//! OneView login session snapshot

use chrono::{DateTime, Utc};

/// A point-in-time view of the management API session.
///
/// Snapshots are never mutated; re-authentication installs a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session with no token
    pub fn empty() -> Self {
        Self::default()
    }

    /// A session holding `token` until `expires_at`
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Some(token.into()),
            expires_at: Some(expires_at),
        }
    }

    /// Token and expiry are present and `now` is before the expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }

    /// The session token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// When the session stops being used
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}
