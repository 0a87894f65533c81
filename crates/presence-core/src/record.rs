//! Attendance records and their `"<name> - <id> - <timestamp>"` ledger encoding.
//!
//! The ledger persists records as delimited strings. Internally records are
//! structured; the string form only exists at the persistence boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Separator between the fields of a persisted record.
pub const RECORD_DELIMITER: &str = " - ";

/// A single admitted attendance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub employee_name: String,
    pub employee_id: String,
    /// ISO-8601 UTC timestamp, e.g. `2024-01-01T00:00:00.000Z`.
    pub timestamp: String,
}

impl AttendanceRecord {
    pub fn new(employee_name: &str, employee_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            employee_name: employee_name.to_string(),
            employee_id: employee_id.to_string(),
            timestamp: format_timestamp(at),
        }
    }

    /// Parse a persisted record string.
    ///
    /// Returns `None` when fewer than three delimited parts are present. Any
    /// delimiters past the second belong to the timestamp.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, RECORD_DELIMITER);
        let employee_name = parts.next()?;
        let employee_id = parts.next()?;
        let timestamp = parts.next()?;
        Some(Self {
            employee_name: employee_name.to_string(),
            employee_id: employee_id.to_string(),
            timestamp: timestamp.to_string(),
        })
    }

    /// Whether the persisted form of this record would parse back unchanged.
    pub fn is_lossless(&self) -> bool {
        !self.employee_name.contains(RECORD_DELIMITER)
            && !self.employee_id.contains(RECORD_DELIMITER)
    }

    /// Parsed timestamp, if it is valid RFC 3339.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{RECORD_DELIMITER}{}{RECORD_DELIMITER}{}",
            self.employee_name, self.employee_id, self.timestamp
        )
    }
}

/// Render a timestamp with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
