//! Two-column CSV report of attendance records.
//!
//! ```text
//! employee,time
//! "Alice (ID: E1)","2024-01-01T00:00:00.000Z"
//! ```
//!
//! Records that do not split into name/id/timestamp are emitted verbatim in
//! the first column with an empty second column; nothing is dropped.

use crate::error::{Result, StoreError};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use presence_core::AttendanceRecord;

const HEADER: &str = "employee,time\n";

pub fn to_csv<S: AsRef<str>>(records: &[S]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(HEADER.as_bytes().to_vec());

    for line in records {
        let line = line.as_ref();
        match AttendanceRecord::parse(line) {
            Some(record) => {
                let employee = format!("{} (ID: {})", record.employee_name, record.employee_id);
                writer.write_record([employee.as_str(), record.timestamp.as_str()])?;
            }
            None => writer.write_record([line, ""])?,
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_record() {
        let csv = to_csv(&["Alice - E1 - 2024-01-01T00:00:00.000Z"]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines,
            ["employee,time", r#""Alice (ID: E1)","2024-01-01T00:00:00.000Z""#]
        );
    }

    #[test]
    fn test_malformed_record_is_kept() {
        let csv = to_csv(&["bad-record"]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines, ["employee,time", r#""bad-record","""#]);
    }

    #[test]
    fn test_extra_delimiters_stay_in_time_column() {
        let csv = to_csv(&["Alice - E1 - 2024 - late".to_string()]).unwrap();
        assert!(csv.contains(r#""Alice (ID: E1)","2024 - late""#));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let csv = to_csv(&[r#"Al "Ace" - E1 - t"#]).unwrap();
        assert!(csv.contains(r#""Al ""Ace"" (ID: E1)","t""#));
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let csv = to_csv::<&str>(&[]).unwrap();
        assert_eq!(csv, "employee,time\n");
    }

    #[test]
    fn test_order_preserved() {
        let csv = to_csv(&["B - 2 - t2", "A - 1 - t1"]).unwrap();
        let lines: Vec<_> = csv.lines().skip(1).collect();
        assert_eq!(lines, [r#""B (ID: 2)","t2""#, r#""A (ID: 1)","t1""#]);
    }
}
