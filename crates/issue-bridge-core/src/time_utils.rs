use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Formats a UTC instant as ISO-8601 with an explicit `+00:00` offset.
pub fn format_iso8601_utc(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parses an ISO-8601 timestamp into UTC.
///
/// Accepts a `Z` suffix or any numeric offset; a value without offset is taken
/// to already be UTC.
pub fn parse_iso8601_utc(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("invalid ISO-8601 timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::{format_iso8601_utc, parse_iso8601_utc};

    #[test]
    fn unit_parse_iso8601_utc_normalizes_offsets() {
        let parsed = parse_iso8601_utc("2025-01-02T09:30:00+09:00").expect("parse");
        assert_eq!(
            parsed,
            chrono::Utc
                .with_ymd_and_hms(2025, 1, 2, 0, 30, 0)
                .single()
                .expect("valid")
        );
    }

    #[test]
    fn unit_parse_iso8601_utc_accepts_zulu_and_naive_values() {
        let zulu = parse_iso8601_utc("2025-03-01T12:00:00Z").expect("zulu");
        let naive = parse_iso8601_utc("2025-03-01T12:00:00").expect("naive");
        assert_eq!(zulu, naive);
    }

    #[test]
    fn regression_parse_iso8601_utc_rejects_garbage() {
        assert!(parse_iso8601_utc("yesterday").is_err());
    }

    #[test]
    fn unit_format_iso8601_utc_uses_numeric_offset() {
        let value = chrono::Utc
            .with_ymd_and_hms(2025, 5, 6, 7, 8, 9)
            .single()
            .expect("valid");
        assert_eq!(format_iso8601_utc(value), "2025-05-06T07:08:09+00:00");
    }
}
