//! Date input normalization for timesheet entries.

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult};

/// Normalize user date input to `YYYY-MM-DD`.
///
/// Accepted forms:
/// - ISO-like strings; the leading `YYYY-MM-DD` is kept (`2025-03-04T10:00:00Z`)
/// - `MM/DD/YYYY`
/// - `YYYY/MM/DD`
pub fn normalize_date_input(raw: &str) -> CoreResult<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(CoreError::ValidationError("Missing date".to_string()));
    }

    let parsed = s
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y/%m/%d").ok());

    parsed
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| {
            CoreError::ValidationError("Invalid date format. Expected YYYY-MM-DD".to_string())
        })
}
