//! In-memory record of alert identities that have been claimed for delivery

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Default retention for claimed identities
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Maps alert identity to the instant it was first claimed.
///
/// One mutex covers lookup and insert, so [`DedupCache::try_claim`] is the
/// single point where concurrent producers decide who delivers an alert.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DedupCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identity` now. True only for the first caller.
    pub fn try_claim(&self, identity: &str) -> bool {
        self.try_claim_at(identity, Utc::now())
    }

    /// Claim `identity` with an explicit timestamp. An existing claim keeps
    /// its original timestamp.
    pub fn try_claim_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(identity) {
            return false;
        }
        entries.insert(identity.to_string(), now);
        true
    }

    /// Whether `identity` is currently claimed
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.lock().contains_key(identity)
    }

    /// When `identity` was claimed
    pub fn claimed_at(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(identity).copied()
    }

    /// Remove entries claimed strictly before `now - ttl`. Returns how many went.
    pub fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let cutoff = now - ttl;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, claimed_at| *claimed_at >= cutoff);
        before - entries.len()
    }

    /// Number of claimed identities
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }
}
