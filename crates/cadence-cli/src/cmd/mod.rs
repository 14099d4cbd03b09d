pub mod config;
pub mod cycle;
pub mod data;
pub mod init;
pub mod scenario;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Parse an instant given as RFC 3339 or as a bare `YYYY-MM-DD` date
/// (midnight UTC).
pub fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid instant '{s}': expected RFC 3339 or YYYY-MM-DD"))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}
