//! Semantic dates
//!
//! Sprint dates are carried as the instant plus the offset the provider
//! reported, not converted to the local wall clock.

use crate::{AgileSyncError, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

/// JIRA's own timestamp layout, e.g. `2019-07-12T22:32:50.376+0200`
const JIRA_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// A date as emitted in the work model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateModel {
    /// Milliseconds since the Unix epoch
    pub epoch: i64,
    /// Offset from UTC in minutes
    pub offset: i32,
    /// RFC 3339 rendering in the source offset
    pub rfc3339: String,
}

impl DateModel {
    pub fn from_datetime(dt: &DateTime<FixedOffset>) -> Self {
        Self {
            epoch: dt.timestamp_millis(),
            offset: dt.offset().local_minus_utc() / 60,
            rfc3339: dt.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        }
    }

    /// Parse an optional provider timestamp; empty means absent
    pub fn parse_opt(ts: Option<&str>) -> Result<Option<Self>> {
        match ts {
            Some(ts) => Ok(parse_provider_time(ts)?.map(|dt| Self::from_datetime(&dt))),
            None => Ok(None),
        }
    }
}

/// Parse a provider timestamp in RFC 3339 or JIRA's compact-offset layout
pub fn parse_provider_time(ts: &str) -> Result<Option<DateTime<FixedOffset>>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_str(ts, JIRA_TIME_FORMAT))
        .map(Some)
        .map_err(|e| AgileSyncError::Parse(format!("invalid timestamp {:?}: {}", ts, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_millis() {
        let date = DateModel::parse_opt(Some("2020-07-30T21:13:24.588Z"))
            .unwrap()
            .unwrap();
        assert_eq!(date.epoch, 1596143604588);
        assert_eq!(date.offset, 0);
        assert_eq!(date.rfc3339, "2020-07-30T21:13:24.588+00:00");
    }

    #[test]
    fn test_whole_seconds_drop_fraction() {
        let date = DateModel::parse_opt(Some("2020-08-13T21:13:00.000Z"))
            .unwrap()
            .unwrap();
        assert_eq!(date.epoch, 1597353180000);
        assert_eq!(date.rfc3339, "2020-08-13T21:13:00+00:00");
    }

    #[test]
    fn test_jira_compact_offset() {
        let date = DateModel::parse_opt(Some("2019-07-12T22:32:50.376+0200"))
            .unwrap()
            .unwrap();
        assert_eq!(date.offset, 120);
        assert_eq!(date.rfc3339, "2019-07-12T22:32:50.376+02:00");
    }

    #[test]
    fn test_empty_and_missing() {
        assert!(DateModel::parse_opt(None).unwrap().is_none());
        assert!(DateModel::parse_opt(Some("")).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = DateModel::parse_opt(Some("yesterday")).unwrap_err();
        assert!(matches!(err, AgileSyncError::Parse(_)));
    }
}
