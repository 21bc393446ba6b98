//! Injectable wall clock.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Source of "now" for timestamps, dedup windows and invoice dates.
pub trait Clock: Send + Sync + core::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = match self.now.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = match self.now.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Parse an operator-entered timestamp.
///
/// Accepts RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS[.fff]]` (a space may
/// replace the `T`) which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 58).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::seconds(3));
        assert_eq!(clock.now(), start + Duration::seconds(3));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn timestamps_accept_form_and_rfc3339_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-01-01T10:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-01T11:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn dates_are_iso_only() {
        assert_eq!(parse_date("2026-02-28"), NaiveDate::from_ymd_opt(2026, 2, 28));
        assert_eq!(parse_date("28/02/2026"), None);
    }
}
