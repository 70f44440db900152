//! Streaming rate control
//!
//! Samples arriving faster than the configured rate are refused, never queued.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Result, TelemetryError};

pub const MIN_RATE_HZ: u16 = 1;
pub const MAX_RATE_HZ: u16 = 1000;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    rate_hz: u16,
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl RateLimiter {
    pub fn new(enabled: bool, rate_hz: u16) -> Result<Self> {
        let mut limiter = Self {
            enabled: false,
            rate_hz: MIN_RATE_HZ,
            min_interval: Duration::from_secs(1),
            last_admitted: None,
        };
        limiter.configure(enabled, rate_hz)?;
        Ok(limiter)
    }

    /// Change mode and rate; a rejected rate leaves the limiter unchanged
    pub fn configure(&mut self, enabled: bool, rate_hz: u16) -> Result<()> {
        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&rate_hz) {
            return Err(TelemetryError::InvalidArgument(format!(
                "rate_hz must be between {} and {}, got {}",
                MIN_RATE_HZ, MAX_RATE_HZ, rate_hz
            )));
        }
        self.enabled = enabled;
        self.rate_hz = rate_hz;
        self.min_interval = Duration::from_micros(1_000_000 / rate_hz as u64);
        self.last_admitted = None;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rate_hz(&self) -> u16 {
        self.rate_hz
    }

    /// Returns true and records `now` if a sample may pass
    pub fn admit(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_bounds() {
        assert!(RateLimiter::new(true, 0).is_err());
        assert!(RateLimiter::new(true, 1001).is_err());
        assert!(RateLimiter::new(true, 1).is_ok());
        assert!(RateLimiter::new(true, 1000).is_ok());
    }

    #[test]
    fn test_rejected_rate_keeps_previous() {
        let mut limiter = RateLimiter::new(true, 50).unwrap();
        assert!(limiter.configure(false, 2000).is_err());
        assert!(limiter.is_enabled());
        assert_eq!(limiter.rate_hz(), 50);
    }

    #[test]
    fn test_disabled_admits_nothing() {
        let mut limiter = RateLimiter::new(false, 100).unwrap();
        assert!(!limiter.admit(Instant::now()));
    }

    #[test]
    fn test_admits_at_rate() {
        let mut limiter = RateLimiter::new(true, 10).unwrap();
        let start = Instant::now();

        assert!(limiter.admit(start));
        assert!(!limiter.admit(start + Duration::from_millis(50)));
        assert!(!limiter.admit(start + Duration::from_millis(99)));
        assert!(limiter.admit(start + Duration::from_millis(100)));
        assert!(!limiter.admit(start + Duration::from_millis(150)));
    }
}
