//! Shared timestamp/date helpers and the CLI response envelope.
//!
//! All persisted timestamps are UTC with second precision and a `Z` suffix
//! (e.g. `2025-09-10T08:30:00Z`); all persisted dates are `YYYY-MM-DD`.

use crate::core::error::LedgerError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use ulid::Ulid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DATE_FORMAT: &str = "%Y-%m-%d";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso() -> String {
    format_timestamp(now())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Compact stamp used in generated artifact names (`20250910T083000`).
pub fn compact_stamp(ts: DateTime<Utc>) -> String {
    ts.format(STAMP_FORMAT).to_string()
}

/// Parse a calendar date. Accepts `YYYY-MM-DD`, or any timestamp accepted by
/// [`parse_timestamp`] (its UTC date is used).
pub fn parse_date(raw: &str) -> Result<NaiveDate, LedgerError> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Ok(d);
    }
    parse_timestamp(s)
        .map(|ts| ts.date_naive())
        .map_err(|_| LedgerError::ValidationError(format!("Cannot parse date '{}'. Expected YYYY-MM-DD.", raw)))
}

/// Parse an ISO-8601 timestamp. A trailing `Z` or explicit offset is honored;
/// naive values are taken as UTC; a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    let s = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Ok(ndt.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(naive, DATE_FORMAT) {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(ndt.and_utc());
        }
    }
    Err(LedgerError::ValidationError(format!(
        "Cannot parse datetime '{}'",
        raw
    )))
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_iso(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
