//! Human duration arguments: `500ms`, `30s`, `5m`, `1h`.

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    static ref DURATION_REGEX: Regex = Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)?\s*$").unwrap();
}

/// Parses a duration. A bare number is seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let caps = DURATION_REGEX
        .captures(text)
        .ok_or_else(|| format!("invalid duration '{}' (expected e.g. 500ms, 30s, 5m, 1h)", text))?;
    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| format!("duration '{}' is too large", text))?;

    let millis = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Some(amount),
        Some("s") | None => amount.checked_mul(1_000),
        Some("m") => amount.checked_mul(60_000),
        Some("h") => amount.checked_mul(3_600_000),
        Some(_) => None,
    };
    millis
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{}' is too large", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
    }
}
