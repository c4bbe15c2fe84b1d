//! Shared row helpers for the SQLite adapters.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::errors::{CoreError, CoreResult};

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps lexicographic order equal to
/// chronological order, which the claim and listing queries rely on.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in storage format.
pub fn now_ts() -> String {
    fmt_ts(Utc::now())
}

/// Parse a stored timestamp.
pub fn parse_ts(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

/// Expiry timestamp `ttl_secs` from now, in storage format.
pub fn expires_ts(ttl_secs: i64) -> String {
    fmt_ts(Utc::now() + chrono::Duration::seconds(ttl_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_keeps_order() {
        let a = fmt_ts(Utc::now());
        let b = fmt_ts(Utc::now() + chrono::Duration::milliseconds(5));
        assert!(a < b);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&fmt_ts(now)).unwrap();
        assert!((now - parsed).num_microseconds().unwrap().abs() < 2);
    }
}
