//! Short-term suppression of repeated alerts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::types::AlertCategory;

// ---

/// How long an entry is kept before it may be purged.
const RETENTION_SECS: i64 = 3600;

/// Last-raised time per composite alert key.
///
/// Process-lifetime only; a restart forgets everything, which at worst lets
/// one duplicate through.
#[derive(Debug, Default)]
pub struct DedupCache {
    last_raised: HashMap<String, DateTime<Utc>>,
}

impl DedupCache {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// `"{CATEGORY}_{location}"` or `"{CATEGORY}_{location}_{detail}"`.
    pub fn key(category: AlertCategory, detail_key: Option<&str>, location: &str) -> String {
        // ---
        match detail_key {
            Some(detail) if !detail.is_empty() => {
                format!("{}_{}_{}", category.as_str(), location, detail)
            }
            _ => format!("{}_{}", category.as_str(), location),
        }
    }

    /// Gate an alert against the current wall clock.
    pub fn should_raise(
        &mut self,
        category: AlertCategory,
        detail_key: Option<&str>,
        location: &str,
    ) -> bool {
        self.should_raise_at(category, detail_key, location, Utc::now())
    }

    /// Gate an alert at `now`.
    ///
    /// A suppressed call leaves the cache untouched, so the window is
    /// measured from the last alert that actually fired.
    pub fn should_raise_at(
        &mut self,
        category: AlertCategory,
        detail_key: Option<&str>,
        location: &str,
        now: DateTime<Utc>,
    ) -> bool {
        // ---
        let key = Self::key(category, detail_key, location);

        let suppressed = self
            .last_raised
            .get(&key)
            .is_some_and(|last| now - *last < category.min_interval());

        if suppressed {
            tracing::debug!(key = %key, "Alert suppressed (recent duplicate)");
            return false;
        }

        self.last_raised.insert(key, now);
        self.purge(now);
        true
    }

    /// Drop entries older than the retention window.
    pub fn purge(&mut self, now: DateTime<Utc>) {
        // ---
        let retention = Duration::seconds(RETENTION_SECS);
        self.last_raised.retain(|_, last| now - *last <= retention);
    }

    pub fn len(&self) -> usize {
        self.last_raised.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_raised.is_empty()
    }
}
