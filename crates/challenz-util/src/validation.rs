use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use thiserror::Error;

pub const MAX_SEARCH_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is too long (max {max}, got {got})")]
    TooLong {
        field: &'static str,
        max: usize,
        got: usize,
    },
    #[error("{field} is not a valid date (expected YYYY-MM-DD or RFC 3339, got '{value}')")]
    InvalidDate { field: &'static str, value: String },
    #[error("{start_field} must not be after {end_field}")]
    InvertedRange {
        start_field: &'static str,
        end_field: &'static str,
    },
    #[error("{field} is out of range ({min}..={max}, got {got})")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        got: i64,
    },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// Which end of a day a bare `YYYY-MM-DD` date resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Parse a date filter. Bare dates cover the whole day: `Start` maps to
/// 00:00:00 and `End` to 23:59:59.999 UTC, so an `endDate` is inclusive.
pub fn parse_date(
    field: &'static str,
    raw: &str,
    bound: DayBound,
) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidDate {
            field,
            value: raw.to_string(),
        }
    })?;
    let time = match bound {
        DayBound::Start => NaiveTime::MIN,
        DayBound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time).and_utc())
}

/// Canonical stored form of a timestamp: `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Every timestamp column uses this layout, so range filters can compare
/// the text directly.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an optional `startDate`/`endDate` pair and check its ordering.
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ValidationError> {
    let start = non_empty(start)
        .map(|s| parse_date("startDate", s, DayBound::Start))
        .transpose()?;
    let end = non_empty(end)
        .map(|s| parse_date("endDate", s, DayBound::End))
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ValidationError::InvertedRange {
                start_field: "startDate",
                end_field: "endDate",
            });
        }
    }
    Ok((start, end))
}

/// Normalize a free-text search term. Returns `None` for blank input.
///
/// Pattern metacharacters (`%`, `_`, `*`) and the filter-list delimiters
/// `,()` are dropped so the term can be embedded in an `ilike` pattern
/// on any backend.
pub fn sanitize_search(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(term) = non_empty(raw) else {
        return Ok(None);
    };
    let got = term.chars().count();
    if got > MAX_SEARCH_LEN {
        return Err(ValidationError::TooLong {
            field: "search",
            max: MAX_SEARCH_LEN,
            got,
        });
    }
    let cleaned: String = term
        .chars()
        .filter(|c| !matches!(c, '%' | '_' | '*' | ',' | '(' | ')' | '\\'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    Ok(Some(cleaned.to_string()))
}

pub fn validate_in_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            got: value,
        });
    }
    Ok(())
}

pub fn validate_title(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(ValidationError::Empty { field });
    }
    if len > max {
        return Err(ValidationError::TooLong { field, max, got: len });
    }
    Ok(())
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}
