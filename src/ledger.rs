// src/ledger.rs
// Idempotency ledger: which external source items have already been turned
// into records. Once a key is present the pipeline never re-processes that
// item, regardless of the outcome of the first attempt.

use crate::types::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdempotencyLedger {
    processed_source_ids: BTreeSet<String>,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

fn key(source_type: SourceType, source_id: &str) -> String {
    format!("{}:{}", source_type.as_str(), source_id)
}

fn has_known_prefix(entry: &str) -> bool {
    entry.starts_with("chat-message:") || entry.starts_with("feed-post:")
}

impl IdempotencyLedger {
    pub fn is_processed(&self, source_type: SourceType, source_id: &str) -> bool {
        self.processed_source_ids
            .contains(&key(source_type, source_id))
    }

    /// Idempotent: marking an already-present key is a no-op.
    pub fn mark_processed(&mut self, source_type: SourceType, source_id: &str) {
        self.processed_source_ids.insert(key(source_type, source_id));
        self.last_sync_timestamp = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.processed_source_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_source_ids.is_empty()
    }

    /// One-time migration of the legacy format: entries recorded before keys
    /// were namespaced carry no `sourceType:` prefix and are treated as chat
    /// messages. Returns how many entries were rewritten so the caller knows
    /// whether to persist the migrated set.
    pub fn migrate_legacy_entries(&mut self) -> usize {
        let (legacy, kept): (BTreeSet<String>, BTreeSet<String>) = std::mem::take(
            &mut self.processed_source_ids,
        )
        .into_iter()
        .partition(|e| !has_known_prefix(e));

        let migrated = legacy.len();
        self.processed_source_ids = kept;
        for entry in legacy {
            self.processed_source_ids
                .insert(key(SourceType::ChatMessage, &entry));
        }
        migrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_per_source_type() {
        let mut ledger = IdempotencyLedger::default();
        ledger.mark_processed(SourceType::ChatMessage, "m1");
        assert!(ledger.is_processed(SourceType::ChatMessage, "m1"));
        assert!(!ledger.is_processed(SourceType::FeedPost, "m1"));
    }

    #[test]
    fn marking_twice_is_a_noop() {
        let mut ledger = IdempotencyLedger::default();
        ledger.mark_processed(SourceType::FeedPost, "p1");
        ledger.mark_processed(SourceType::FeedPost, "p1");
        assert_eq!(ledger.len(), 1);
        assert!(ledger.last_sync_timestamp.is_some());
    }

    #[test]
    fn legacy_entries_become_chat_message_keys() {
        let mut ledger: IdempotencyLedger = serde_json::from_str(
            r#"{"processedSourceIds":["abc123","feed-post:p1","chat-message:m1"]}"#,
        )
        .unwrap();
        let migrated = ledger.migrate_legacy_entries();
        assert_eq!(migrated, 1);
        assert!(ledger.is_processed(SourceType::ChatMessage, "abc123"));
        assert!(ledger.is_processed(SourceType::FeedPost, "p1"));
        assert!(ledger.is_processed(SourceType::ChatMessage, "m1"));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn migration_on_clean_ledger_rewrites_nothing() {
        let mut ledger = IdempotencyLedger::default();
        ledger.mark_processed(SourceType::ChatMessage, "m1");
        assert_eq!(ledger.migrate_legacy_entries(), 0);
        assert!(ledger.is_processed(SourceType::ChatMessage, "m1"));
    }
}
