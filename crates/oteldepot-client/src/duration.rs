//! Relative duration parsing for `--since`/`--until`.
//!
//! Accepts the compound form Go's `time.ParseDuration` does for the units
//! that make sense on a CLI: `300ms`, `52s`, `2m`, `3h`, `1h30m`. A bare
//! number is seconds.

use std::time::Duration;

use crate::ClientError;

pub fn parse_duration(input: &str) -> Result<Duration, ClientError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ClientError::Config("empty duration".to_owned()));
    }

    // Bare number: seconds.
    if input.chars().all(|c| c.is_ascii_digit()) {
        let seconds: u64 = input
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid duration {input:?}")))?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ClientError::Config(format!("missing unit in duration {input:?}")))?;
        if digits_end == 0 {
            return Err(ClientError::Config(format!("invalid duration {input:?}")));
        }
        let value: u64 = rest[..digits_end]
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid duration {input:?}")))?;

        let unit_end = rest[digits_end..]
            .find(|c: char| c.is_ascii_digit())
            .map_or(rest.len(), |offset| digits_end + offset);
        let unit = &rest[digits_end..unit_end];
        let part = match unit {
            "ns" => Duration::from_nanos(value),
            "us" | "µs" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            other => {
                return Err(ClientError::Config(format!(
                    "unknown duration unit {other:?} in {input:?}"
                )))
            }
        };
        total += part;
        rest = &rest[unit_end..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("52s").unwrap(), Duration::from_secs(52));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("3h").unwrap(), Duration::from_secs(10_800));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(5_400)
        );
        assert_eq!(
            parse_duration("2m15s").unwrap(),
            Duration::from_secs(135)
        );
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("52").unwrap(), Duration::from_secs(52));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("m5").is_err());
    }
}
