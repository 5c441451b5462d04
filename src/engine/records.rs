//! The record model: one logged event and the ordered set of all events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::filter::QueryFilter;
use crate::{Error, Result};

/// Caller-supplied metadata attached to a record.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Longest preview collaborators are expected to store.
pub const DEFAULT_PREVIEW_CHARS: usize = 2000;

/// The kind of activity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EmailSummary,
    ResumeTailor,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::EmailSummary, EventType::ResumeTailor, EventType::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EmailSummary => "email_summary",
            EventType::ResumeTailor => "resume_tailor",
            EventType::Other => "other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown event type: {}", s)))
    }
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub preview: String,
}

/// Insertion-ordered records plus the highest id ever handed out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    last_id: u64,
    #[serde(default)]
    records: Vec<LogRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record stamped with the current time (second precision).
    pub fn append(&mut self, event_type: EventType, meta: Meta, preview: impl Into<String>) -> u64 {
        self.append_at(event_type, meta, preview, Utc::now().trunc_subsecs(0))
    }

    /// Appends a record with an explicit timestamp and returns its id.
    ///
    /// Ids continue from the high-water mark, so an id freed by [`delete`]
    /// is never handed out again.
    ///
    /// [`delete`]: RecordSet::delete
    pub fn append_at(&mut self, event_type: EventType, meta: Meta, preview: impl Into<String>, timestamp: DateTime<Utc>) -> u64 {
        let id = self.high_water_mark() + 1;
        self.last_id = id;
        self.records.push(LogRecord {
            id,
            timestamp,
            event_type,
            meta,
            preview: preview.into(),
        });
        id
    }

    /// Removes the record with `id`. Returns false, leaving the set untouched,
    /// when no such record exists.
    pub fn delete(&mut self, id: u64) -> bool {
        match self.records.iter().position(|r| r.id == id) {
            Some(idx) => {
                self.records.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn query(&self, filter: &QueryFilter) -> Vec<LogRecord> {
        filter.apply(&self.records)
    }

    /// Brings `last_id` up to at least the largest stored id. Applied after
    /// decoding so a payload can never lead to a reused id.
    pub(crate) fn normalize(&mut self) {
        self.last_id = self.high_water_mark();
    }

    fn high_water_mark(&self) -> u64 {
        let max_stored = self.records.iter().map(|r| r.id).max().unwrap_or(0);
        self.last_id.max(max_stored)
    }
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
