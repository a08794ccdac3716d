//! Date span validation for legacy datasets

use super::Error;
use chrono::{NaiveDate, NaiveDateTime};

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Canonical rendering of span bounds
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn parse_bound(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Validate a `[from, to]` span and return it in canonical form
///
/// Each bound must be `DD.MM.YYYY HH:MM:SS` or `DD.MM.YYYY`, and `from` must
/// not be after `to`.
pub fn normalize_span(span: Option<&[String]>) -> Result<Vec<String>, Error> {
    let span = span.ok_or(Error::SpanMissing)?;
    let [from, to] = span else {
        return Err(Error::SpanLength(span.len()));
    };

    let from_dt = parse_bound(from).ok_or_else(|| Error::SpanFormat(from.clone()))?;
    let to_dt = parse_bound(to).ok_or_else(|| Error::SpanFormat(to.clone()))?;
    if from_dt > to_dt {
        return Err(Error::SpanOrder {
            from: from.clone(),
            to: to.clone(),
        });
    }

    Ok(vec![
        from_dt.format(CANONICAL_FORMAT).to_string(),
        to_dt.format(CANONICAL_FORMAT).to_string(),
    ])
}
