use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::store::{KeyValueStore, get_one, set_one};

pub const HISTORY_STORAGE_KEY: &str = "conversion_history";
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub original: String,
    pub converted: String,
    pub source: String,
}

impl HistoryEntry {
    pub fn now(original: &str, converted: &str, source: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();
        Self {
            timestamp,
            original: original.to_string(),
            converted: converted.to_string(),
            source: source.to_string(),
        }
    }

    pub fn format_line(&self) -> String {
        let when = OffsetDateTime::from_unix_timestamp(self.timestamp)
            .ok()
            .and_then(|time| time.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.timestamp.to_string());
        format!(
            "{}\t{} → {}\t{}",
            when, self.original, self.converted, self.source
        )
    }
}

/// Newest-first list of successful conversions, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct ConversionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl ConversionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn load(store: &dyn KeyValueStore, capacity: usize) -> Result<Self> {
        let mut history = Self::new(capacity);
        if let Some(value) = get_one(store, HISTORY_STORAGE_KEY)? {
            let stored: Vec<HistoryEntry> =
                serde_json::from_value(value).with_context(|| "failed to parse history")?;
            history.entries = stored.into_iter().take(history.capacity).collect();
        }
        Ok(history)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let value = serde_json::to_value(&self.entries)?;
        set_one(store, HISTORY_STORAGE_KEY, value)
    }
}
