use chrono::{DateTime, TimeZone};
use std::time::{Duration, Instant};

pub const FORMATTING_WARNING_WINDOW: Duration = Duration::from_secs(10);

/// Lets a repeating warning through at most once per window.
pub struct WarningThrottle {
    window: Duration,
    last_warning: Option<Instant>,
}

impl WarningThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_warning: None,
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        match self.last_warning {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_warning = Some(now);
                true
            }
        }
    }
}

/// Second-resolution timestamp usable in a directory name (':' becomes '_').
pub fn path_safe_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%dT%H:%M:%S").to_string().replace(':', "_")
}

/// Timestamp prefix of every persisted record.
pub fn record_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string()
}
