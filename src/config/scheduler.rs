//! Scheduler settings loaded from environment variables.

use crate::errors::{Error, Result};
use std::time::Duration;

const DEFAULT_REPORT_INTERVAL_SECS: u64 = 3600;

/// Reads how often scheduled report jobs are enqueued.
///
/// Uses `REPORT_INTERVAL_SECS`, defaulting to one hour.
///
/// # Errors
/// Returns an error if the variable is set but is not a positive integer.
pub fn report_interval() -> Result<Duration> {
    match std::env::var("REPORT_INTERVAL_SECS") {
        Ok(raw) => parse_interval(&raw),
        Err(_) => Ok(Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS)),
    }
}

fn parse_interval(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config {
            message: format!("REPORT_INTERVAL_SECS must be a positive integer, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert!(matches!(parse_interval("60"), Ok(d) if d == Duration::from_secs(60)));
        assert!(matches!(parse_interval(" 5 "), Ok(d) if d == Duration::from_secs(5)));
        assert!(matches!(parse_interval("0"), Err(Error::Config { .. })));
        assert!(matches!(parse_interval("soon"), Err(Error::Config { .. })));
    }
}
