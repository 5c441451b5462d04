//! Stateless predicates over the in-memory record list.

use chrono::NaiveDate;

use crate::engine::records::{EventType, LogRecord};
use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Type filter value the UI uses for "no filter".
pub const MATCH_ALL_TYPES: &str = "All";

/// A conjunction of optional filters. The default matches every record.
///
/// Date bounds are inclusive and compare against the UTC calendar date of the
/// record's timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub event_type: Option<EventType>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl QueryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    /// Builds a filter from its string form. Empty strings (and `All` for the
    /// type) leave that filter inactive; dates use `YYYY-MM-DD`.
    pub fn parse(event_type: Option<&str>, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let event_type = match non_empty(event_type) {
            None | Some(MATCH_ALL_TYPES) => None,
            Some(t) => Some(t.parse()?),
        };
        Ok(Self {
            event_type,
            start: non_empty(start).map(parse_date).transpose()?,
            end: non_empty(end).map(parse_date).transpose()?,
        })
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(t) = self.event_type {
            if record.event_type != t {
                return false;
            }
        }
        let date = record.timestamp.date_naive();
        if self.start.map_or(false, |s| date < s) {
            return false;
        }
        if self.end.map_or(false, |e| date > e) {
            return false;
        }
        true
    }

    /// Matching records in their original order.
    pub fn apply(&self, records: &[LogRecord]) -> Vec<LogRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| Error::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}
