//! Recipient segmentation.
//!
//! A recipient-selection filter, applied in two passes over the broad
//! contact set: tag-set membership and field-presence checks first, then
//! the repeat-count ("returning only") pass, then a final cut to contacts
//! with a usable email. Repeat detection deliberately runs on the
//! already-date/tag-filtered set, so it is recency-scoped: a guest with
//! many visits outside the window does not count as returning.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Contact;

/// Stored per-campaign audience filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentFilter {
    /// Recency window: only contacts last seen within this many days.
    #[serde(default)]
    pub last_seen_within_days: Option<i64>,
    #[serde(default)]
    pub require_email: bool,
    #[serde(default)]
    pub require_mobile: bool,
    /// Contact must carry at least one of these tags (when non-empty).
    #[serde(default)]
    pub include_tags: Vec<String>,
    /// Contact must carry none of these tags.
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Keep only contacts whose email occurs more than once in the
    /// filtered set.
    #[serde(default)]
    pub returning_only: bool,
}

impl SegmentFilter {
    /// Lower bound for the broad contact fetch, if a window is set.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.last_seen_within_days.map(|days| now - Duration::days(days))
    }
}

/// Trimmed, lower-cased email, or `None` when unusable.
pub fn normalized_email(contact: &Contact) -> Option<String> {
    contact
        .email
        .as_ref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// Apply the filter to an already-fetched contact set.
pub fn apply(contacts: Vec<Contact>, filter: &SegmentFilter) -> Vec<Contact> {
    let filtered: Vec<Contact> = contacts
        .into_iter()
        .filter(|c| {
            if filter.require_email && normalized_email(c).is_none() {
                return false;
            }
            if filter.require_mobile
                && !c.mobile.as_ref().is_some_and(|m| !m.trim().is_empty())
            {
                return false;
            }
            if !filter.include_tags.is_empty()
                && !filter.include_tags.iter().any(|t| c.tags.contains(t))
            {
                return false;
            }
            if c.tags.iter().any(|t| filter.exclude_tags.contains(t)) {
                return false;
            }
            true
        })
        .collect();

    let filtered: Vec<Contact> = if filter.returning_only {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for contact in &filtered {
            if let Some(email) = normalized_email(contact) {
                *counts.entry(email).or_insert(0) += 1;
            }
        }
        filtered
            .into_iter()
            .filter(|c| {
                normalized_email(c)
                    .map(|e| counts.get(&e).copied().unwrap_or(0) > 1)
                    .unwrap_or(false)
            })
            .collect()
    } else {
        filtered
    };

    filtered
        .into_iter()
        .filter(|c| normalized_email(c).is_some())
        .collect()
}

/// One recipient per mailbox: keep the first occurrence of each
/// normalized email. Segmentation keeps duplicate rows (repeat visits);
/// a send must not message the same mailbox twice in one run.
pub fn distinct_recipients(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut seen: Vec<String> = Vec::new();
    contacts
        .into_iter()
        .filter(|c| match normalized_email(c) {
            Some(email) if !seen.contains(&email) => {
                seen.push(email);
                true
            }
            _ => false,
        })
        .collect()
}
