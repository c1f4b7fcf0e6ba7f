//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! ISO 8601 conversion between `YYYY-MM-DDTHH:MM:SSZ` text and Apple-epoch
//! seconds, used by the XML and OpenStep codecs.
//!
//! Grounded on `examples/original_source/src/Date.cpp`, which performs the
//! same calendar math against `CFAbsoluteTime`; here the civil-calendar
//! arithmetic is delegated to `chrono` instead of hand-rolled.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::tree::MAC_EPOCH_UNIX_OFFSET;

/// Parses `YYYY-MM-DDTHH:MM:SSZ` into Apple-epoch seconds. Rejects anything
/// outside the 11..31 character range up front, per the XML codec's rule.
pub fn parse_iso8601(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.len() < 11 || text.len() > 31 {
        return Err(Error::Parse(format!("date string length {} out of range 11..31", text.len())));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ"))
        .map_err(|e| Error::Parse(format!("invalid ISO 8601 date {:?}: {}", text, e)))?;
    let unix_seconds = Utc.from_utc_datetime(&naive).timestamp() as f64
        + (naive.and_utc().timestamp_subsec_nanos() as f64 / 1_000_000_000.0);
    Ok(unix_seconds - MAC_EPOCH_UNIX_OFFSET as f64)
}

/// Formats Apple-epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_iso8601(absolute_time: f64) -> String {
    let unix_seconds = absolute_time + MAC_EPOCH_UNIX_OFFSET as f64;
    let secs = unix_seconds.floor() as i64;
    let dt: DateTime<Utc> = Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_round_trip() {
        let seconds = parse_iso8601("2001-01-01T00:00:00Z").unwrap();
        assert_eq!(seconds, 0.0);
        assert_eq!(format_iso8601(0.0), "2001-01-01T00:00:00Z");
    }

    #[test]
    fn test_unix_epoch_offset() {
        let seconds = parse_iso8601("1970-01-01T00:00:00Z").unwrap();
        assert_eq!(seconds, -(MAC_EPOCH_UNIX_OFFSET as f64));
    }

    #[test]
    fn test_rejects_short_string() {
        assert!(parse_iso8601("2020").is_err());
    }
}
