//! JSON bodies exchanged between the daemon and its clients.
//!
//! They mirror the web binding: `{password}`, `{type,start,end}`,
//! `{event_type,meta,preview}`, `{id}` in, `{logs}` out.

use serde::{Deserialize, Serialize};

use crate::{EventType, LogRecord, Meta, QueryFilter, Result};

#[derive(Serialize, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

impl std::fmt::Debug for UnlockRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockRequest").field("password", &"[REDACTED]").finish()
    }
}

/// Filter in its string form, as sent by a UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl ListRequest {
    pub fn to_filter(&self) -> Result<QueryFilter> {
        QueryFilter::parse(self.event_type.as_deref(), self.start.as_deref(), self.end.as_deref())
    }
}

impl From<&QueryFilter> for ListRequest {
    fn from(filter: &QueryFilter) -> Self {
        Self {
            event_type: filter.event_type.map(|t| t.to_string()),
            start: filter.start.map(|d| d.format("%Y-%m-%d").to_string()),
            end: filter.end.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub event_type: EventType,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogRecord>,
}
