//! External collaborators consumed by the supervisor

use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::telemetry::CsiSample;

/// Source of CSI samples
#[async_trait]
pub trait CsiCollector: Send {
    /// Wait at most `timeout` for the next sample
    async fn pop(&mut self, timeout: Duration) -> Option<CsiSample>;

    /// Hand a sample back once its transmission attempt is over
    fn release(&mut self, sample: CsiSample);
}

/// Synchronized wall clock
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync {
    /// Corrected time in microseconds since the Unix epoch
    fn now_us(&self) -> u64;

    fn is_synchronized(&self) -> bool;
}

/// Over-the-air update check
#[async_trait]
pub trait UpdateTrigger: Send + Sync {
    /// Returns true when an update is available
    async fn check_now(&self) -> Result<bool>;
}

/// Platform health readings
#[cfg_attr(test, automock)]
pub trait SystemProbe: Send + Sync {
    fn free_heap(&self) -> u32;
    fn min_free_heap(&self) -> u32;
    fn cpu_usage_percent(&self) -> u8;
    fn wifi_rssi(&self) -> i8;
    fn task_count(&self) -> u16;
    fn ip_address(&self) -> String;
    fn uptime_sec(&self) -> u64;

    /// True when the uplink is usable for request/response traffic
    fn network_up(&self) -> bool;
}

/// Full device restart
#[cfg_attr(test, automock)]
pub trait RestartHandle: Send + Sync {
    fn restart(&self, reason: &str);
}

/// Host clock; always reported as synchronized
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        chrono::Utc::now().timestamp_micros().max(0) as u64
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}
