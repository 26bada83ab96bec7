//! Retention policy enforcement.
//!
//! Pure selection over a listing snapshot; the orchestrator performs the
//! deletions and tolerates individual failures.

use crate::config::RetentionPolicy;
use crate::transport::RemoteArchiveEntry;
use chrono::{DateTime, Duration, Utc};

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl RetentionReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Entries older than `now - window_days`.
///
/// `entries` must belong to a single source. The newest entry is never
/// selected, so a source always keeps at least one archive.
pub fn select_for_deletion(
    entries: &[RemoteArchiveEntry],
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<RemoteArchiveEntry> {
    if policy.keeps_everything() {
        return Vec::new();
    }

    // A window reaching past the calendar's start leaves nothing old enough.
    let Some(cutoff) = Duration::try_days(i64::from(policy.window_days))
        .and_then(|window| now.checked_sub_signed(window))
    else {
        return Vec::new();
    };
    let newest = newest_entry(entries);

    entries
        .iter()
        .filter(|entry| entry.name.timestamp() < cutoff)
        .filter(|entry| !newest.is_some_and(|n| std::ptr::eq(n, *entry)))
        .cloned()
        .collect()
}

/// Entry with the greatest timestamp, ties broken by remote path
pub fn newest_entry(entries: &[RemoteArchiveEntry]) -> Option<&RemoteArchiveEntry> {
    entries
        .iter()
        .max_by(|a, b| {
            a.name
                .timestamp()
                .cmp(&b.name.timestamp())
                .then_with(|| a.remote_path.cmp(&b.remote_path))
        })
}
