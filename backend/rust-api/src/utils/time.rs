use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use std::sync::Mutex;

/// Source of "now" for response-time measurement.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::milliseconds(ms);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Milliseconds from `from` to `to`, clamped at zero.
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub fn bson_to_chrono(dt: BsonDateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(dt.timestamp_millis())
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_ms(150);
        assert_eq!(elapsed_ms(start, clock.now()), 150);
    }

    #[test]
    fn elapsed_is_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let earlier = start - chrono::Duration::seconds(5);
        assert_eq!(elapsed_ms(start, earlier), 0);
    }

    #[test]
    fn bson_conversion_keeps_millisecond_precision() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(bson_to_chrono(chrono_to_bson(at)), at);
    }
}
