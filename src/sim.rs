//! # Host Simulation
//!
//! Stand-ins for the radio and platform services so the node can run on an
//! ordinary host. The collector produces synthetic samples at a fixed rate.

use async_trait::async_trait;
use std::f32::consts::{PI, TAU};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::supervisor::{Clock, RestartHandle, SampleSender, SystemProbe, UpdateTrigger};
use crate::telemetry::CsiSample;

/// Subcarriers per synthetic sample
pub const SIM_SUBCARRIERS: usize = 52;

/// Transmitter address used by the synthetic collector
pub const SIM_MAC: [u8; 6] = [0x24, 0x6F, 0x28, 0x00, 0x00, 0x01];

/// Periodic producer of synthetic CSI samples
pub struct SimulatedCollector {
    sender: SampleSender,
    rate_hz: u16,
    channel: u16,
}

impl SimulatedCollector {
    pub fn new(sender: SampleSender, rate_hz: u16) -> Self {
        Self {
            sender,
            rate_hz: rate_hz.max(1),
            channel: 6,
        }
    }

    /// Build the `index`-th sample of the synthetic sequence
    pub fn sample(index: u64, timestamp_us: u64, channel: u16) -> CsiSample {
        let phase_shift = (index % 360) as f32 * PI / 180.0;
        let amplitude = (0..SIM_SUBCARRIERS)
            .map(|k| 10.0 + 5.0 * (k as f32 * 0.2 + phase_shift).sin())
            .collect();
        let phase = (0..SIM_SUBCARRIERS)
            .map(|k| ((k as f32 * 0.1 + phase_shift) % TAU) - PI)
            .collect();
        let rssi = -45 - (index % 10) as i8;

        let mut sample = CsiSample::new(timestamp_us, SIM_MAC, rssi, channel, amplitude);
        sample.phase = Some(phase);
        sample
    }

    /// Run the producer until `shutdown` turns true
    pub fn spawn(
        self,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_micros(1_000_000 / u64::from(self.rate_hz));
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut index = 0u64;

            info!("Simulated collector producing {} samples/s", self.rate_hz);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let sample = Self::sample(index, clock.now_us(), self.channel);
                        if !self.sender.try_push(sample) {
                            debug!("Sample queue full, synthetic sample {} dropped", index);
                        }
                        index = index.wrapping_add(1);
                    }
                }
            }

            info!(
                pushed = self.sender.pushed(),
                rejected = self.sender.rejected(),
                "Simulated collector stopped"
            );
        })
    }
}

/// Health readings for a host process
#[derive(Debug, Clone)]
pub struct HostProbe {
    started: Instant,
    free_heap: u32,
    ip_address: String,
}

impl HostProbe {
    pub fn new(free_heap: u32) -> Self {
        Self {
            started: Instant::now(),
            free_heap,
            ip_address: "127.0.0.1".to_string(),
        }
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new(256 * 1024)
    }
}

impl SystemProbe for HostProbe {
    fn free_heap(&self) -> u32 {
        self.free_heap
    }

    fn min_free_heap(&self) -> u32 {
        self.free_heap
    }

    fn cpu_usage_percent(&self) -> u8 {
        0
    }

    fn wifi_rssi(&self) -> i8 {
        -50
    }

    fn task_count(&self) -> u16 {
        1
    }

    fn ip_address(&self) -> String {
        self.ip_address.clone()
    }

    fn uptime_sec(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn network_up(&self) -> bool {
        true
    }
}

/// Restart handle that ends the process loop instead of rebooting
#[derive(Debug)]
pub struct LoggingRestart {
    shutdown: watch::Sender<bool>,
}

impl LoggingRestart {
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self { shutdown }
    }
}

impl RestartHandle for LoggingRestart {
    fn restart(&self, reason: &str) {
        warn!("Restart requested: {}", reason);
        self.shutdown.send_replace(true);
    }
}

/// Update check that never finds an update
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticUpdateTrigger;

#[async_trait]
impl UpdateTrigger for StaticUpdateTrigger {
    async fn check_now(&self) -> Result<bool> {
        debug!("No update source configured");
        Ok(false)
    }
}
