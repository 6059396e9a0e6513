//! Draft persistence for the booking form.
//!
//! The store is a best-effort cache, not a source of truth: loading always
//! yields a usable snapshot and saving never fails the caller. Oversized,
//! corrupt or unwritable drafts are logged and dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{BookingConfig, DraftLimits};
use crate::form::{FormSnapshot, merge_with_defaults};
use crate::storage::{KeyValueStore, StorageResult, text_len};

/// The persisted envelope, as written
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftRecord<'a> {
    form_data: &'a FormSnapshot,
    saved_at: String,
}

/// The persisted envelope, as read back. `formData` is kept loose so old or
/// partial drafts can be merged onto the current defaults.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDraft {
    form_data: Map<String, Value>,
    #[serde(default)]
    saved_at: Option<Value>,
}

/// Serialize a snapshot into the draft envelope.
pub fn encode_draft(form: &FormSnapshot, saved_at: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string(&DraftRecord {
        form_data: form,
        saved_at: saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Parse a draft envelope into a complete snapshot and its save time.
pub fn decode_draft(raw: &str) -> serde_json::Result<(FormSnapshot, Option<DateTime<Utc>>)> {
    let stored: StoredDraft = serde_json::from_str(raw)?;
    let saved_at = stored
        .saved_at
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok((merge_with_defaults(&stored.form_data), saved_at))
}

/// What happened when a draft was loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No draft stored
    Empty,
    Restored { saved_at: Option<DateTime<Utc>> },
    /// Stored draft exceeded the read ceiling and was removed unread
    DiscardedOversized { len: usize },
    /// Stored draft could not be parsed and was removed
    DiscardedCorrupt,
    /// The store itself failed
    StoreUnavailable,
}

/// What happened when a draft was saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { len: usize },
    /// Draft exceeded the save ceiling; the previous draft is left in place
    SkippedOversized { len: usize },
    /// The store rejected the write; the draft slot was cleared and these
    /// oversized entries were evicted to reclaim space
    WriteFailed { evicted: Vec<String> },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Loads and saves the form snapshot under a single key of a [`KeyValueStore`].
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    limits: DraftLimits,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &BookingConfig) -> Self {
        Self::with_limits(store, config.draft_key.clone(), config.limits)
    }

    pub fn with_limits(store: Arc<dyn KeyValueStore>, key: impl Into<String>, limits: DraftLimits) -> Self {
        Self {
            store,
            key: key.into(),
            limits,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn limits(&self) -> DraftLimits {
        self.limits
    }

    /// Restore the stored snapshot, falling back to the defaults whenever
    /// the draft is missing, oversized, corrupt or unreadable.
    pub fn load(&self) -> (FormSnapshot, LoadOutcome) {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (FormSnapshot::default(), LoadOutcome::Empty),
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to load draft");
                self.discard();
                return (FormSnapshot::default(), LoadOutcome::StoreUnavailable);
            }
        };

        let len = text_len(&raw);
        if len > self.limits.read_ceiling {
            warn!(
                key = %self.key,
                len,
                limit = self.limits.read_ceiling,
                "Saved draft too large, removing"
            );
            self.discard();
            return (
                FormSnapshot::default(),
                LoadOutcome::DiscardedOversized { len },
            );
        }

        match decode_draft(&raw) {
            Ok((form, saved_at)) => {
                info!(key = %self.key, len, saved_at = ?saved_at, "Restored draft");
                (form, LoadOutcome::Restored { saved_at })
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to parse draft");
                self.discard();
                (FormSnapshot::default(), LoadOutcome::DiscardedCorrupt)
            }
        }
    }

    pub fn save(&self, form: &FormSnapshot) -> SaveOutcome {
        self.save_at(form, Utc::now())
    }

    /// Save with an explicit timestamp.
    pub fn save_at(&self, form: &FormSnapshot, saved_at: DateTime<Utc>) -> SaveOutcome {
        let encoded = match encode_draft(form, saved_at) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to serialize draft");
                return SaveOutcome::WriteFailed {
                    evicted: self.reclaim_space(),
                };
            }
        };

        let len = text_len(&encoded);
        if len > self.limits.save_ceiling {
            warn!(
                key = %self.key,
                len,
                limit = self.limits.save_ceiling,
                "Draft too large, skipping save"
            );
            return SaveOutcome::SkippedOversized { len };
        }

        match self.store.set(&self.key, &encoded) {
            Ok(()) => {
                debug!(key = %self.key, len, "Saved draft");
                SaveOutcome::Saved { len }
            }
            Err(e) => {
                error!(key = %self.key, len, error = %e, "Failed to save draft");
                SaveOutcome::WriteFailed {
                    evicted: self.reclaim_space(),
                }
            }
        }
    }

    /// Remove the stored draft.
    pub fn clear(&self) -> StorageResult<()> {
        self.store.remove(&self.key)
    }

    fn discard(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            error!(key = %self.key, error = %e, "Failed to clear draft");
        }
    }

    /// Drop the draft slot, then evict every other entry above the cleanup
    /// threshold. Failures are logged and otherwise ignored.
    fn reclaim_space(&self) -> Vec<String> {
        let mut evicted = Vec::new();

        if let Err(e) = self.store.remove(&self.key) {
            error!(key = %self.key, error = %e, "Failed to clear storage");
            return evicted;
        }
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Failed to clear storage");
                return evicted;
            }
        };

        for key in keys {
            let oversized = match self.store.get(&key) {
                Ok(Some(value)) => text_len(&value) > self.limits.cleanup_threshold,
                Ok(None) => false,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping entry during cleanup");
                    false
                }
            };
            if !oversized {
                continue;
            }
            match self.store.remove(&key) {
                Ok(()) => evicted.push(key),
                Err(e) => debug!(key = %key, error = %e, "Failed to evict entry"),
            }
        }

        if !evicted.is_empty() {
            warn!(count = evicted.len(), keys = ?evicted, "Evicted oversized entries to reclaim space");
        }
        evicted
    }
}
