use chrono::{DateTime, FixedOffset, Utc};
use std::sync::RwLock;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = time;
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += duration;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// ISO-8601 in UTC with a literal `Z`. Sub-second digits are dropped, not rounded.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTimestamps {
    /// When the measurement was taken.
    pub timestamp: String,
    /// When the server accepted it.
    pub received_at: String,
}

/// Reads the clock once. That instant is always the receipt time, and is
/// also the reading time when the caller did not send one.
pub fn resolve_timestamps(
    supplied: Option<DateTime<FixedOffset>>,
    clock: &dyn Clock,
) -> ResolvedTimestamps {
    let now = clock.now();
    let reading_time = supplied
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now);

    ResolvedTimestamps {
        timestamp: format_timestamp(reading_time),
        received_at: format_timestamp(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_format_truncates_subseconds() {
        assert_eq!(
            format_timestamp(at("2026-01-19T12:34:56.999Z")),
            "2026-01-19T12:34:56Z"
        );
        assert_eq!(
            format_timestamp(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            "2026-01-02T03:04:05Z"
        );
    }

    #[test]
    fn test_supplied_timestamp_is_converted_to_utc() {
        let clock = FixedClock::new(at("2026-06-01T00:00:00Z"));
        let supplied = DateTime::parse_from_rfc3339("2026-01-19T14:34:56.5+02:00").unwrap();

        let resolved = resolve_timestamps(Some(supplied), &clock);
        assert_eq!(resolved.timestamp, "2026-01-19T12:34:56Z");
        assert_eq!(resolved.received_at, "2026-06-01T00:00:00Z");
    }

    #[test]
    fn test_missing_timestamp_uses_clock() {
        let clock = FixedClock::new(at("2026-03-04T05:06:07.890Z"));
        let resolved = resolve_timestamps(None, &clock);
        assert_eq!(resolved.timestamp, "2026-03-04T05:06:07Z");
        assert_eq!(resolved.received_at, resolved.timestamp);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::new(at("2026-03-04T05:06:07Z"));
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(format_timestamp(clock.now()), "2026-03-04T05:07:08Z");

        clock.set_time(at("2030-01-01T00:00:00Z"));
        assert_eq!(format_timestamp(clock.now()), "2030-01-01T00:00:00Z");
    }
}
