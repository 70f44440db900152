//! # Stream Channel Module
//!
//! Persistent binary connection to the collection service.
//!
//! This module handles:
//! - The connection state machine (connect, handshake, reconnect, close)
//! - A bounded outbound send buffer with drop-newest overflow
//! - Keepalive pings and round-trip latency measurement
//! - Inbound frame validation with a consecutive-failure threshold
//! - Streaming rate control for CSI samples
//!
//! Lifecycle events are queued to a registered sink with `try_send` and
//! never processed on the connection task itself.

pub mod buffer;
pub mod rate;
pub mod state;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, TelemetryError};
use crate::telemetry::{
    Alert, CsiSample, Heartbeat, HeartbeatStatus, StreamCounters, StreamStats,
    SystemMetricsSnapshot,
};
use crate::wire::payload::{
    decode_nonce, encode_batch, encode_json, encode_nonce, encode_sample,
};
use crate::wire::{
    decode_frame, MessageTag, WireEncoder, HEADER_SIZE, MAX_BATCH_SAMPLES, MAX_PAYLOAD_SIZE,
};

pub use buffer::SendBuffer;
pub use rate::RateLimiter;
pub use state::{ChannelEvent, ChannelState};
pub use transport::{Inbound, StreamConnector, StreamLink, WsConnector};

/// Unanswered pings kept for latency matching
const MAX_PENDING_PINGS: usize = 16;

/// WebSocket routes on the collection service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPath {
    Telemetry,
    CsiStream,
    Metrics,
}

impl StreamPath {
    pub fn path(&self) -> &'static str {
        match self {
            StreamPath::Telemetry => "/ws/telemetry",
            StreamPath::CsiStream => "/ws/csi-stream",
            StreamPath::Metrics => "/ws/metrics",
        }
    }

    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// How a connected session ended
enum SessionEnd {
    Stopped,
    Failed(String),
}

/// State shared between the channel handle and its connection task
struct Shared {
    config: StreamConfig,
    url: String,
    encoder: WireEncoder,
    buffer: SendBuffer,
    counters: StreamCounters,
    state_tx: watch::Sender<ChannelState>,
    sink: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    pending_pings: Mutex<HashMap<u32, Instant>>,
    next_nonce: AtomicU32,
    rate: Mutex<RateLimiter>,
    created: Instant,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Move to `to`; once Closed the state never changes again
    fn set_state(&self, to: ChannelState) {
        let mut from = to;
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == to || state.is_terminal() {
                return false;
            }
            from = *state;
            *state = to;
            true
        });

        if changed {
            debug!("Stream state {} -> {}", from, to);
            self.emit(ChannelEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let mut sink = lock(&self.sink);
        let Some(tx) = sink.as_ref() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => self.counters.record_event_dropped(),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event sink closed, unregistering");
                *sink = None;
            }
        }
    }

    fn enqueue(&self, tag: MessageTag, payload: &[u8]) -> Result<()> {
        let state = self.state();
        let may_buffer = !state.is_terminal() && self.config.buffer_while_disconnected;
        if state != ChannelState::Connected && !may_buffer {
            self.counters.record_failed();
            return Err(TelemetryError::NotConnected);
        }

        let frame = self.encoder.frame(tag, payload)?;
        let frame_len = frame.len();
        match self.buffer.push(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.counters.record_dropped();
                warn!("Send buffer full, dropping {:?} frame ({} bytes)", tag, frame_len);
                self.emit(ChannelEvent::BufferOverflow { frame_len });
                Err(e)
            }
        }
    }

    fn handshake_frame(&self) -> Result<bytes::Bytes> {
        let hello = Heartbeat {
            status: HeartbeatStatus::Online,
            timestamp_us: chrono::Utc::now().timestamp_micros().max(0) as u64,
            uptime_sec: self.created.elapsed().as_secs(),
            ip_address: String::new(),
            wifi_rssi: 0,
            error_message: None,
        };
        let body = encode_json(self.encoder.device_id(), &hello)?;
        self.encoder.frame(MessageTag::Heartbeat, &body)
    }

    /// Validate one inbound binary frame; returns a reply to write, if any
    fn handle_frame(&self, data: &[u8]) -> Result<Option<bytes::Bytes>> {
        let message = decode_frame(data)?;

        let reply = match message.tag() {
            MessageTag::Pong => {
                let nonce = decode_nonce(&message.payload)?;
                let sent = lock(&self.pending_pings).remove(&nonce);
                match sent {
                    Some(sent) => {
                        let latency = sent.elapsed();
                        self.counters.record_latency(latency);
                        self.emit(ChannelEvent::PongReceived { latency });
                    }
                    None => debug!("Pong with unknown nonce {}", nonce),
                }
                None
            }
            MessageTag::Ping => {
                let nonce = decode_nonce(&message.payload)?;
                Some(self.encoder.frame(MessageTag::Pong, &encode_nonce(nonce))?)
            }
            other => {
                debug!("Ignoring inbound {:?} frame from {}", other, message.device_id);
                None
            }
        };

        self.counters.record_received();
        Ok(reply)
    }

    /// Sequence and send one frame; frames reach the wire in sequence order
    async fn write(
        &self,
        link: &mut Box<dyn StreamLink>,
        frame: bytes::Bytes,
    ) -> std::result::Result<(), String> {
        let frame = self.encoder.stamp(frame);
        let len = frame.len();
        match timeout(self.config.connect_timeout(), link.send(frame)).await {
            Ok(Ok(())) => {
                self.counters.record_sent(len);
                Ok(())
            }
            Ok(Err(e)) => {
                self.counters.record_failed();
                Err(e.to_string())
            }
            Err(_) => {
                self.counters.record_failed();
                Err("send timed out".to_string())
            }
        }
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// Connection task: connect, run a session, reconnect until stopped
async fn run_connection(
    shared: Arc<Shared>,
    connector: Arc<dyn StreamConnector>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let config = &shared.config;
    let device_id = shared.encoder.device_id().to_string();

    loop {
        shared.set_state(ChannelState::Connecting);
        info!("Connecting to {}", shared.url);

        let attempt = timeout(
            config.connect_timeout(),
            connector.connect(&shared.url, &device_id, config.auth_token.as_deref()),
        );
        let outcome = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => break,
            outcome = attempt => outcome,
        };

        let failure = match outcome {
            Ok(Ok(mut link)) => match handshake(&shared, &mut link).await {
                Ok(()) => {
                    shared.set_state(ChannelState::Connected);
                    shared.emit(ChannelEvent::Connected);
                    info!("Stream connected to {}", shared.url);

                    let end = session(&shared, &mut link, &mut stop_rx).await;
                    let _ = timeout(config.connect_timeout(), link.close()).await;
                    match end {
                        SessionEnd::Stopped => break,
                        SessionEnd::Failed(reason) => {
                            shared.emit(ChannelEvent::Disconnected { reason: reason.clone() });
                            reason
                        }
                    }
                }
                Err(reason) => format!("handshake failed: {}", reason),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("connect timed out after {:?}", config.connect_timeout()),
        };

        shared.counters.record_connection_error();
        warn!("Stream connection error: {}", failure);
        shared.emit(ChannelEvent::Error(failure));

        shared.set_state(ChannelState::Reconnecting);
        if !config.auto_reconnect {
            info!("Auto-reconnect disabled, closing stream channel");
            break;
        }

        tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => break,
            _ = sleep(config.reconnect_timeout()) => {}
        }
        shared.counters.record_reconnect_attempt();
    }

    shared.set_state(ChannelState::Closed);
}

async fn handshake(
    shared: &Shared,
    link: &mut Box<dyn StreamLink>,
) -> std::result::Result<(), String> {
    let hello = shared.handshake_frame().map_err(|e| e.to_string())?;
    shared.write(link, hello).await
}

async fn session(
    shared: &Shared,
    link: &mut Box<dyn StreamLink>,
    stop_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let period = shared.config.keepalive_interval().max(Duration::from_secs(1));
    let mut keepalive = interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut framing_run = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = stop_requested(stop_rx) => return SessionEnd::Stopped,

            inbound = link.recv() => match inbound {
                None => return SessionEnd::Failed("connection closed by peer".to_string()),
                Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                Some(Ok(Inbound::Text(text))) => {
                    framing_run = 0;
                    shared.counters.record_received();
                    shared.emit(ChannelEvent::Control(text));
                }
                Some(Ok(Inbound::Binary(data))) => match shared.handle_frame(&data) {
                    Ok(reply) => {
                        framing_run = 0;
                        if let Some(reply) = reply {
                            if let Err(reason) = shared.write(link, reply).await {
                                return SessionEnd::Failed(reason);
                            }
                        }
                    }
                    Err(e) => {
                        framing_run += 1;
                        shared.counters.record_framing_error();
                        let limit = shared.config.max_framing_errors;
                        warn!("Dropped bad inbound frame ({}/{}): {}", framing_run, limit, e);
                        shared.emit(ChannelEvent::FramingError(e.to_string()));
                        if framing_run >= limit {
                            let reason = format!("{} consecutive framing errors", framing_run);
                            return SessionEnd::Failed(reason);
                        }
                    }
                },
            },

            frame = shared.buffer.next() => {
                if let Err(reason) = shared.write(link, frame).await {
                    return SessionEnd::Failed(reason);
                }
            }

            _ = keepalive.tick() => {
                if let Err(e) = queue_ping(shared) {
                    warn!("Keepalive ping not queued: {}", e);
                }
            }
        }
    }
}

fn queue_ping(shared: &Shared) -> Result<u32> {
    let nonce = shared.next_nonce.fetch_add(1, Ordering::Relaxed);
    {
        let mut pending = lock(&shared.pending_pings);
        if pending.len() >= MAX_PENDING_PINGS {
            pending.clear();
        }
        pending.insert(nonce, Instant::now());
    }

    if let Err(e) = shared.enqueue(MessageTag::Ping, &encode_nonce(nonce)) {
        lock(&shared.pending_pings).remove(&nonce);
        return Err(e);
    }
    Ok(nonce)
}

/// Streaming channel handle
///
/// Configuration is fixed for the life of an instance. After `stop()` the
/// instance is `Closed` for good; build a new one to reconnect with new
/// settings.
pub struct StreamChannel {
    shared: Arc<Shared>,
    connector: Arc<dyn StreamConnector>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamChannel {
    /// Create a channel for the default CSI stream path
    pub fn new(
        config: StreamConfig,
        device_id: &str,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self> {
        Self::with_path(config, device_id, StreamPath::CsiStream, connector)
    }

    pub fn with_path(
        config: StreamConfig,
        device_id: &str,
        path: StreamPath,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self> {
        let overhead = HEADER_SIZE + device_id.len();
        if config.buffer_size <= overhead {
            return Err(TelemetryError::Config(format!(
                "stream.buffer_size {} cannot hold a frame for device id '{}'",
                config.buffer_size, device_id
            )));
        }
        let payload_limit = (config.buffer_size - overhead).min(MAX_PAYLOAD_SIZE);

        let shared = Shared {
            url: path.url(&config.server_url),
            encoder: WireEncoder::new(device_id, payload_limit),
            buffer: SendBuffer::new(config.buffer_size),
            counters: StreamCounters::default(),
            state_tx: watch::Sender::new(ChannelState::Disconnected),
            sink: Mutex::new(None),
            pending_pings: Mutex::new(HashMap::new()),
            next_nonce: AtomicU32::new(1),
            rate: Mutex::new(RateLimiter::new(true, rate::MAX_RATE_HZ)?),
            created: Instant::now(),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            connector,
            stop_tx: watch::Sender::new(false),
            task: Mutex::new(None),
        })
    }

    /// Spawn the connection task
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the channel is already running or has been closed
    pub fn start(&self) -> Result<()> {
        let mut task = lock(&self.task);
        if task.is_some() {
            return Err(TelemetryError::InvalidArgument(
                "stream channel already started".to_string(),
            ));
        }
        if self.state().is_terminal() {
            return Err(TelemetryError::InvalidArgument("stream channel is closed".to_string()));
        }

        let shared = self.shared.clone();
        let connector = self.connector.clone();
        let stop_rx = self.stop_tx.subscribe();
        *task = Some(tokio::spawn(run_connection(shared, connector, stop_rx)));
        Ok(())
    }

    /// Stop the connection task and close the channel
    ///
    /// Returns within `connect_timeout_ms` even if a connect or send is hanging.
    /// The state is `Closed` when this returns.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            if timeout(self.shared.config.connect_timeout(), &mut handle).await.is_err() {
                error!("Stream task did not stop in time, aborting");
                handle.abort();
            }
        }

        self.shared.set_state(ChannelState::Closed);
        let dropped = self.shared.buffer.clear();
        if dropped > 0 {
            debug!("Discarded {} queued frames on stop", dropped);
        }
        info!("Stream channel closed");
    }

    /// Queue one frame for sending
    ///
    /// # Errors
    ///
    /// - `NotConnected` if not connected and buffering while disconnected is off
    /// - `PayloadTooLarge` if the payload exceeds the buffer-derived limit
    /// - `BufferFull` if the send buffer cannot hold the frame (it is dropped)
    pub fn send(&self, tag: MessageTag, payload: &[u8]) -> Result<()> {
        self.shared.enqueue(tag, payload)
    }

    pub fn send_sample(&self, sample: &CsiSample) -> Result<()> {
        self.send(MessageTag::CsiData, &encode_sample(sample)?)
    }

    /// Send up to 50 samples as one `BatchCsi` frame
    ///
    /// Returns `Ok(false)` without sending anything for an empty slice.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for more than 50 samples; callers pre-chunk
    pub fn send_batch(&self, samples: &[CsiSample]) -> Result<bool> {
        if samples.is_empty() {
            return Ok(false);
        }
        if samples.len() > MAX_BATCH_SAMPLES {
            return Err(TelemetryError::InvalidArgument(format!(
                "batch of {} samples exceeds {}",
                samples.len(),
                MAX_BATCH_SAMPLES
            )));
        }
        self.send(MessageTag::BatchCsi, &encode_batch(samples)?)?;
        Ok(true)
    }

    pub fn send_metrics(&self, metrics: &SystemMetricsSnapshot) -> Result<()> {
        self.send(MessageTag::SystemMetrics, &encode_json(self.device_id(), metrics)?)
    }

    pub fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.send(MessageTag::Heartbeat, &encode_json(self.device_id(), heartbeat)?)
    }

    pub fn send_alert(&self, alert: &Alert) -> Result<()> {
        self.send(MessageTag::Alert, &encode_json(self.device_id(), alert)?)
    }

    /// Queue a `Ping` and remember when it was dispatched
    ///
    /// Returns the nonce the matching `Pong` will carry.
    pub fn ping(&self) -> Result<u32> {
        queue_ping(&self.shared)
    }

    /// Set streaming mode and rate
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `rate_hz` is outside 1..=1000
    pub fn set_streaming_mode(&self, enable: bool, rate_hz: u16) -> Result<()> {
        lock(&self.shared.rate).configure(enable, rate_hz)?;
        info!("Streaming {} at {} Hz", if enable { "enabled" } else { "disabled" }, rate_hz);
        Ok(())
    }

    /// True if streaming is on and a sample may pass at the configured rate
    pub fn admit_sample(&self) -> bool {
        lock(&self.shared.rate).admit(Instant::now())
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared.rate).is_enabled()
    }

    pub fn streaming_rate_hz(&self) -> u16 {
        lock(&self.shared.rate).rate_hz()
    }

    /// Deliver lifecycle events to `sink`, replacing any previous sink
    pub fn register_event_sink(&self, sink: mpsc::Sender<ChannelEvent>) {
        *lock(&self.shared.sink) = Some(sink);
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.counters.snapshot()
    }

    pub fn device_id(&self) -> &str {
        self.shared.encoder.device_id()
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn payload_limit(&self) -> usize {
        self.shared.encoder.payload_limit()
    }

    pub fn queued_frames(&self) -> usize {
        self.shared.buffer.len()
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}
