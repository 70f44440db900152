//! # HTTP Channel Module
//!
//! Request/response sender for low-frequency telemetry.
//!
//! This module handles:
//! - The fixed endpoint set (CSI data, system metrics, heartbeat, alert)
//! - Bounded retries with a per-attempt timeout and exponential backoff
//! - Connection-wide gzip compression when `compress_data` is set
//! - Request statistics

pub mod transport;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::{Result, TelemetryError};
use crate::telemetry::{
    Alert, CsiDocument, CsiSample, Heartbeat, HttpCounters, HttpStats, SystemMetricsSnapshot,
};
use crate::wire::payload::encode_json;

pub use transport::{HttpTransport, ReqwestTransport};

/// Largest backoff multiplier between attempts
const MAX_BACKOFF_FACTOR: u64 = 64;

/// Fixed HTTP routes; no other routes exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CsiData,
    SystemMetrics,
    Heartbeat,
    Alert,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::CsiData => "/api/csi/data",
            Endpoint::SystemMetrics => "/api/system/metrics",
            Endpoint::Heartbeat => "/api/device/heartbeat",
            Endpoint::Alert => "/api/device/alert",
        }
    }

    /// Join the route onto a server base URL
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Request/response channel
///
/// Stateless per call. Every `send` either succeeds or uses up its attempts
/// and reports `TransmissionFailed`.
pub struct HttpChannel {
    config: HttpConfig,
    device_id: String,
    transport: Arc<dyn HttpTransport>,
    headers: Vec<(String, String)>,
    counters: HttpCounters,
    stop_tx: watch::Sender<bool>,
}

impl HttpChannel {
    pub fn new(
        config: HttpConfig,
        device_id: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let device_id = device_id.into();

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("X-Device-ID".to_string(), device_id.clone()),
        ];
        if let Some(token) = &config.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        if config.compress_data {
            headers.push(("Content-Encoding".to_string(), "gzip".to_string()));
        }

        info!("HTTP channel for {} (compression: {})", config.server_url, config.compress_data);

        Self {
            config,
            device_id,
            transport,
            headers,
            counters: HttpCounters::default(),
            stop_tx: watch::Sender::new(false),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn stats(&self) -> HttpStats {
        self.counters.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Make every later send fail fast
    ///
    /// A send waiting between attempts gives up at once. An attempt already
    /// on the wire still ends within its timeout.
    pub fn stop(&self) {
        if self.stop_tx.send_if_modified(|stopped| !std::mem::replace(stopped, true)) {
            info!("HTTP channel stopped");
        }
    }

    /// Delay before attempt `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = (1u64 << attempt.saturating_sub(1).min(6)).min(MAX_BACKOFF_FACTOR);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    fn encode_body(&self, body: &[u8]) -> Result<Vec<u8>> {
        if !self.config.compress_data {
            return Ok(body.to_vec());
        }
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
        encoder.write_all(body)?;
        Ok(encoder.finish()?)
    }

    /// POST a body to an endpoint
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Target route
    /// * `body` - Uncompressed JSON body
    /// * `retry_count` - Total attempts; 0 is treated as 1
    ///
    /// # Errors
    ///
    /// - `Transport` if the channel has been stopped
    /// - `TransmissionFailed` once all attempts are used up. `requests_failed`
    ///   goes up by one per call, not per attempt.
    pub async fn send(&self, endpoint: Endpoint, body: &[u8], retry_count: u32) -> Result<()> {
        if self.is_stopped() {
            return Err(TelemetryError::Transport("channel stopped".to_string()));
        }

        let attempts = retry_count.max(1);
        let url = endpoint.url(&self.config.server_url);
        let body = self.encode_body(body)?;
        let per_attempt = self.config.timeout();
        let mut stop_rx = self.stop_tx.subscribe();
        let mut made = 0;

        while made < attempts {
            if made > 0 && self.is_stopped() {
                break;
            }
            made += 1;
            self.counters.record_attempt();

            let post = self.transport.post(&url, body.clone(), &self.headers, per_attempt);
            let outcome = timeout(per_attempt, post).await;
            match outcome {
                Ok(Ok(status)) if (200..300).contains(&status) => {
                    self.counters.record_success(body.len());
                    debug!("POST {} ok ({} bytes, attempt {})", endpoint, body.len(), made);
                    return Ok(());
                }
                Ok(Ok(status)) => {
                    warn!("POST {} attempt {}/{}: HTTP {}", endpoint, made, attempts, status)
                }
                Ok(Err(e)) if !e.is_transient() => {
                    warn!("POST {} attempt {}/{}: {} (not retried)", endpoint, made, attempts, e);
                    break;
                }
                Ok(Err(e)) => warn!("POST {} attempt {}/{}: {}", endpoint, made, attempts, e),
                Err(_) => warn!(
                    "POST {} attempt {}/{}: timed out after {:?}",
                    endpoint, made, attempts, per_attempt
                ),
            }

            if made < attempts {
                tokio::select! {
                    biased;
                    _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                        debug!("POST {} abandoned, channel stopped", endpoint);
                        break;
                    }
                    _ = sleep(self.backoff(made)) => {}
                }
            }
        }

        self.counters.record_failure();
        Err(TelemetryError::TransmissionFailed {
            endpoint: endpoint.to_string(),
            attempts: made,
        })
    }

    /// Send a record as a device-tagged JSON document
    pub async fn send_json<T: Serialize + Sync>(
        &self,
        endpoint: Endpoint,
        record: &T,
        retry_count: u32,
    ) -> Result<()> {
        let body = encode_json(&self.device_id, record)?;
        self.send(endpoint, &body, retry_count).await
    }

    /// Send one CSI sample; best-effort, never retried
    pub async fn send_csi(&self, sample: &CsiSample) -> Result<()> {
        let body = serde_json::to_vec(&CsiDocument::new(&self.device_id, sample))?;
        self.send(Endpoint::CsiData, &body, 1).await
    }

    pub async fn send_metrics(&self, metrics: &SystemMetricsSnapshot) -> Result<()> {
        self.send_json(Endpoint::SystemMetrics, metrics, self.config.retry_count).await
    }

    pub async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.send_json(Endpoint::Heartbeat, heartbeat, self.config.retry_count).await
    }

    pub async fn send_alert(&self, alert: &Alert) -> Result<()> {
        self.send_json(Endpoint::Alert, alert, self.config.retry_count).await
    }
}
