use chrono::DateTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current Unix time in seconds.
///
/// Token issuance, token expiry and reset-token expiry all read the time
/// through this trait so every component agrees on "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock backed by `SystemTime`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        get_current_timestamp()
    }
}

/// Clock that only moves when told to. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            current: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, seconds: u64) {
        self.current.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: u64) {
        self.current.store(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Format a timestamp the way the `Expires` cookie attribute expects it
pub fn format_http_date(timestamp: u64) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Get current Unix timestamp
pub fn get_current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format duration in seconds to human readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours", seconds / 3600)
    } else {
        format!("{} days", seconds / 86400)
    }
}

/// Parse a duration such as `90d`, `12h`, `30m`, `45s` or a bare number of
/// seconds. Returns `None` for anything else.
pub fn parse_duration(input: &str) -> Option<u64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (digits, multiplier) = match input.chars().last()? {
        's' => (&input[..input.len() - 1], 1),
        'm' => (&input[..input.len() - 1], 60),
        'h' => (&input[..input.len() - 1], 3600),
        'd' => (&input[..input.len() - 1], 86400),
        c if c.is_ascii_digit() => (input, 1),
        _ => return None,
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_formatting() {
        assert_eq!(format_http_date(1609459200), "Fri, 01 Jan 2021 00:00:00 GMT");
    }

    #[test]
    fn test_current_timestamp() {
        let timestamp = get_current_timestamp();
        assert!(timestamp > 0);
        assert!(SystemClock.now() >= timestamp);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(601);
        assert_eq!(clock.now(), 1_601);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(30), "30 seconds");
        assert_eq!(format_duration(600), "10 minutes");
        assert_eq!(format_duration(3600), "1 hours");
        assert_eq!(format_duration(86400), "1 days");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("90d"), Some(90 * 86400));
        assert_eq!(parse_duration("12h"), Some(12 * 3600));
        assert_eq!(parse_duration("30m"), Some(1800));
        assert_eq!(parse_duration("45s"), Some(45));
        assert_eq!(parse_duration("3600"), Some(3600));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("d"), None);
        assert_eq!(parse_duration("ten minutes"), None);
    }
}
