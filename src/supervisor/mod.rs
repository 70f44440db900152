//! # Supervisor Module
//!
//! Single control loop for the node.
//!
//! Every tick the supervisor drains channel events, takes at most one CSI
//! sample from the collector, corrects its timestamp, and routes it onto the
//! stream channel in batches. It also runs the periodic housekeeping:
//! stats logging, metrics, heartbeat, update checks and the low-memory guard.

pub mod collaborators;
pub mod commands;
pub mod queue;
pub mod remote_config;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigStore};
use crate::error::{Result, TelemetryError};
use crate::http::{Endpoint, HttpChannel};
use crate::stream::{ChannelEvent, StreamChannel};
use crate::telemetry::{
    Alert, AlertLevel, CsiSample, Heartbeat, HeartbeatStatus, SystemMetricsSnapshot,
};
use crate::wire::payload::split_batch;

pub use collaborators::{
    Clock, CsiCollector, RestartHandle, SystemClock, SystemProbe, UpdateTrigger,
};
pub use commands::{CommandDispatcher, CommandHandler, ControlMessage, RemoteCommand};
pub use queue::{sample_queue, SampleQueue, SampleSender};
pub use remote_config::{ConfigChange, RemoteConfigUpdate};

/// Longest a tick waits for a sample
const MAX_POP_WAIT: Duration = Duration::from_millis(100);

/// Grace period before a remotely requested restart
const REMOTE_RESTART_GRACE: Duration = Duration::from_secs(2);

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    /// Clock unsynchronized or stream down; the loop keeps going
    Degraded,
    /// Terminal
    Restarting,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::Degraded => "degraded",
            SupervisorState::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// Supervisor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub ticks: u64,
    pub samples_processed: u64,
    pub samples_streamed: u64,
    pub samples_dropped: u64,
    pub batches_sent: u64,
    pub metrics_published: u64,
    pub heartbeats_sent: u64,
    pub update_checks: u64,
    pub events_handled: u64,
}

impl SupervisorStats {
    fn record_batch(&mut self, count: usize, result: Result<()>) {
        let count = count as u64;
        match result {
            Ok(()) => {
                self.batches_sent += 1;
                self.samples_streamed += count;
            }
            Err(e) => {
                debug!("Batch of {} samples dropped: {}", count, e);
                self.samples_dropped += count;
            }
        }
    }
}

/// External collaborators handed to the supervisor
pub struct Collaborators {
    pub collector: Box<dyn CsiCollector>,
    pub clock: Arc<dyn Clock>,
    pub probe: Arc<dyn SystemProbe>,
    pub restart: Arc<dyn RestartHandle>,
    pub update: Option<Arc<dyn UpdateTrigger>>,
    pub config_store: Option<Arc<dyn ConfigStore>>,
}

/// Next due time of each periodic action
struct Schedule {
    stats: Instant,
    metrics: Instant,
    heartbeat: Instant,
    update: Instant,
}

impl Schedule {
    fn starting_at(now: Instant, config: &Config) -> Self {
        let s = &config.supervisor;
        Self {
            stats: now + Duration::from_secs(s.stats_interval_sec),
            metrics: now + Duration::from_secs(s.metrics_interval_sec),
            heartbeat: now + Duration::from_secs(s.heartbeat_interval_sec),
            update: now + Duration::from_secs(s.update_check_interval_sec),
        }
    }
}

pub struct Supervisor {
    config: Config,
    collector: Box<dyn CsiCollector>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn SystemProbe>,
    restart: Arc<dyn RestartHandle>,
    update: Option<Arc<dyn UpdateTrigger>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    http: Option<HttpChannel>,
    stream: Option<StreamChannel>,
    events: mpsc::Receiver<ChannelEvent>,
    dispatcher: CommandDispatcher,
    state_tx: watch::Sender<SupervisorState>,
    stats: SupervisorStats,
    schedule: Schedule,
    batch: Vec<CsiSample>,
    batch_started: Option<Instant>,
    batch_size: usize,
    last_error: Option<String>,
}

impl Supervisor {
    /// Build a supervisor over the enabled channels
    ///
    /// Channel events from `stream` are queued and drained only by this
    /// supervisor's own task.
    pub fn new(
        config: Config,
        http: Option<HttpChannel>,
        stream: Option<StreamChannel>,
        collaborators: Collaborators,
    ) -> Self {
        let (event_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        if let Some(stream) = &stream {
            stream.register_event_sink(event_tx);
        }

        let batch_size = config.supervisor.batch_size;
        let schedule = Schedule::starting_at(Instant::now(), &config);

        Self {
            collector: collaborators.collector,
            clock: collaborators.clock,
            probe: collaborators.probe,
            restart: collaborators.restart,
            update: collaborators.update,
            config_store: collaborators.config_store,
            http,
            stream,
            events,
            dispatcher: CommandDispatcher::new(),
            state_tx: watch::Sender::new(SupervisorState::Idle),
            stats: SupervisorStats::default(),
            schedule,
            batch: Vec::new(),
            batch_started: None,
            batch_size,
            last_error: None,
            config,
        }
    }

    /// Register business logic for a remote command
    ///
    /// A registered handler replaces the built-in `get_status` and `restart` behavior.
    pub fn register_command(&mut self, command: RemoteCommand, handler: Arc<dyn CommandHandler>) {
        self.dispatcher.register(command, handler);
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> Option<&HttpChannel> {
        self.http.as_ref()
    }

    pub fn stream(&self) -> Option<&StreamChannel> {
        self.stream.as_ref()
    }

    fn set_state(&self, to: SupervisorState) {
        let from = self.state_tx.send_replace(to);
        if from == to {
            return;
        }
        match to {
            SupervisorState::Degraded => warn!(
                "Supervisor degraded: {}",
                self.last_error.as_deref().unwrap_or("unknown cause")
            ),
            SupervisorState::Restarting => error!("Supervisor restarting"),
            _ => info!("Supervisor {} -> {}", from, to),
        }
    }

    /// Start the channels and enter Running
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if already started, or any error from `StreamChannel::start`
    pub fn start(&mut self) -> Result<()> {
        if self.state() != SupervisorState::Idle {
            return Err(TelemetryError::InvalidArgument(format!(
                "supervisor cannot start from {}",
                self.state()
            )));
        }

        if let Some(stream) = &self.stream {
            let s = &self.config.supervisor;
            stream.set_streaming_mode(s.streaming_enabled, s.stream_rate_hz)?;
            stream.start()?;
        }

        self.schedule = Schedule::starting_at(Instant::now(), &self.config);
        self.set_state(SupervisorState::Running);
        info!(
            "Supervisor running (http: {}, stream: {})",
            self.http.is_some(),
            self.stream.is_some()
        );
        Ok(())
    }

    /// Tick until `shutdown` turns true or a restart is requested
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.supervisor.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    info!("Supervisor shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.tick().await;
            if self.state() == SupervisorState::Restarting {
                break;
            }
        }
    }

    /// Stop both channels and release any pending batch
    pub async fn stop(&mut self) {
        self.discard_batch("supervisor stopping");
        if let Some(stream) = &self.stream {
            stream.stop().await;
        }
        if let Some(http) = &self.http {
            http.stop();
        }
        if matches!(self.state(), SupervisorState::Running | SupervisorState::Degraded) {
            self.set_state(SupervisorState::Idle);
        }
    }

    /// Run one iteration of the control loop
    pub async fn tick(&mut self) {
        if matches!(self.state(), SupervisorState::Idle | SupervisorState::Restarting) {
            return;
        }
        self.stats.ticks += 1;

        self.drain_events().await;
        if self.state() == SupervisorState::Restarting {
            return;
        }
        self.update_health();

        let wait = self.config.supervisor.tick().min(MAX_POP_WAIT);
        if let Some(mut sample) = self.collector.pop(wait).await {
            self.stats.samples_processed += 1;
            if self.clock.is_synchronized() {
                sample.timestamp_us = self.clock.now_us();
            }
            self.route(sample);
        }
        self.flush_if_due();

        let now = Instant::now();
        let s = self.config.supervisor.clone();

        if now >= self.schedule.stats {
            self.schedule.stats = now + Duration::from_secs(s.stats_interval_sec);
            self.log_stats();
        }

        if now >= self.schedule.metrics {
            self.schedule.metrics = now + Duration::from_secs(s.metrics_interval_sec);
            if self.is_connected() {
                if let Err(e) = self.publish_metrics().await {
                    warn!("Metrics publish failed: {}", e);
                }
            }
        }

        if now >= self.schedule.heartbeat {
            self.schedule.heartbeat = now + Duration::from_secs(s.heartbeat_interval_sec);
            if self.is_connected() {
                if let Err(e) = self.publish_heartbeat().await {
                    warn!("Heartbeat failed: {}", e);
                }
            }
        }

        if s.auto_update && now >= self.schedule.update {
            self.schedule.update = now + Duration::from_secs(s.update_check_interval_sec);
            self.spawn_update_check();
        }

        let free_heap = self.probe.free_heap();
        if free_heap < s.low_heap_threshold_bytes {
            let e = TelemetryError::CriticalResource(format!(
                "free heap {} bytes below {} bytes",
                free_heap, s.low_heap_threshold_bytes
            ));
            error!("{}", e);
            self.last_error = Some(e.to_string());

            self.set_state(SupervisorState::Restarting);
            let alert = Alert::new(
                AlertLevel::Critical,
                "supervisor",
                e.to_string(),
                self.clock.now_us(),
            );
            self.send_alert_once(&alert).await;
            self.restart_after(Duration::from_millis(s.restart_grace_ms), &e.to_string()).await;
        }
    }

    async fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.stats.events_handled += 1;
            match event {
                ChannelEvent::Control(text) => {
                    if let Err(e) = self.handle_control(&text).await {
                        warn!("Control message rejected: {}", e);
                    }
                    if self.state() == SupervisorState::Restarting {
                        return;
                    }
                }
                ChannelEvent::Disconnected { reason } => {
                    // Samples for a dead connection are not held back
                    self.discard_batch("stream disconnected");
                    self.last_error = Some(format!("stream disconnected: {}", reason));
                }
                ChannelEvent::Error(message) => self.last_error = Some(message),
                ChannelEvent::BufferOverflow { frame_len } => {
                    warn!("Stream send buffer overflow ({} byte frame dropped)", frame_len)
                }
                ChannelEvent::FramingError(message) => debug!("Stream framing error: {}", message),
                ChannelEvent::StateChanged { from, to } => debug!("Stream {} -> {}", from, to),
                ChannelEvent::Connected => info!("Stream connected"),
                ChannelEvent::PongReceived { latency } => debug!("Stream round trip {:?}", latency),
            }
        }
    }

    fn update_health(&mut self) {
        let clock_ok = self.clock.is_synchronized();
        let stream_ok = !self.config.supervisor.streaming_enabled
            || self.stream.as_ref().map_or(true, |s| s.is_connected());

        if clock_ok && stream_ok {
            if self.state() == SupervisorState::Degraded {
                self.last_error = None;
                self.set_state(SupervisorState::Running);
            }
            return;
        }

        if !clock_ok {
            self.last_error = Some("clock not synchronized".to_string());
        } else if self.last_error.is_none() {
            self.last_error = Some("stream not connected".to_string());
        }
        self.set_state(SupervisorState::Degraded);
    }

    fn is_connected(&self) -> bool {
        let stream_up = self.stream.as_ref().map_or(false, |s| s.is_connected());
        let http_up = self.http.is_some() && self.probe.network_up();
        stream_up || http_up
    }

    fn route(&mut self, sample: CsiSample) {
        let admitted = match &self.stream {
            Some(stream) => stream.is_streaming() && stream.is_connected() && stream.admit_sample(),
            None => false,
        };

        if !admitted {
            self.stats.samples_dropped += 1;
            self.collector.release(sample);
            return;
        }

        if self.batch.is_empty() {
            self.batch_started = Some(Instant::now());
        }
        self.batch.push(sample);
        if self.batch.len() >= self.batch_size {
            self.flush_batch();
        }
    }

    fn flush_if_due(&mut self) {
        let Some(started) = self.batch_started else {
            return;
        };
        if self.stream.as_ref().map_or(true, |s| !s.is_connected()) {
            self.discard_batch("stream not connected");
            return;
        }
        if started.elapsed() >= Duration::from_millis(self.config.supervisor.batch_flush_ms) {
            self.flush_batch();
        }
    }

    /// Send the pending batch, then release every sample in it
    fn flush_batch(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        self.batch_started = None;
        if batch.is_empty() {
            return;
        }

        match &self.stream {
            Some(stream) if self.batch_size == 1 => {
                for sample in &batch {
                    self.stats.record_batch(1, stream.send_sample(sample));
                }
            }
            // A batch too large for one frame goes out as several
            Some(stream) => {
                for run in split_batch(&batch, stream.payload_limit()) {
                    self.stats.record_batch(run.len(), stream.send_batch(run).map(|_| ()));
                }
            }
            None => self.stats.record_batch(batch.len(), Err(TelemetryError::NotConnected)),
        }

        for sample in batch {
            self.collector.release(sample);
        }
    }

    fn discard_batch(&mut self, reason: &str) {
        self.batch_started = None;
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        debug!("Releasing {} pending samples: {}", batch.len(), reason);
        self.stats.samples_dropped += batch.len() as u64;
        for sample in batch {
            self.collector.release(sample);
        }
    }

    fn log_stats(&self) {
        let http = self.http.as_ref().map(|h| h.stats()).unwrap_or_default();
        let stream = self.stream.as_ref().map(|s| s.stats()).unwrap_or_default();
        let s = &self.stats;
        info!(
            state = %self.state(),
            ticks = s.ticks,
            samples_processed = s.samples_processed,
            samples_streamed = s.samples_streamed,
            samples_dropped = s.samples_dropped,
            batches_sent = s.batches_sent,
            http_sent = http.requests_sent,
            http_failed = http.requests_failed,
            stream_sent = stream.messages_sent,
            stream_dropped = stream.messages_dropped,
            stream_latency_ms = stream.avg_latency_ms,
            free_heap = self.probe.free_heap(),
            "Supervisor stats"
        );
    }

    /// Current health snapshot
    pub fn metrics_snapshot(&self) -> SystemMetricsSnapshot {
        let http = self.http.as_ref().map(|h| h.stats()).unwrap_or_default();
        let stream = self.stream.as_ref().map(|s| s.stats()).unwrap_or_default();

        SystemMetricsSnapshot {
            timestamp_us: self.clock.now_us(),
            uptime_sec: self.probe.uptime_sec(),
            free_heap_bytes: self.probe.free_heap(),
            min_free_heap_bytes: self.probe.min_free_heap(),
            cpu_usage_percent: self.probe.cpu_usage_percent(),
            wifi_rssi: self.probe.wifi_rssi(),
            task_count: self.probe.task_count(),
            csi_samples_processed: self.stats.samples_processed,
            csi_samples_dropped: self.stats.samples_dropped,
            http_requests_sent: http.requests_sent,
            http_requests_failed: http.requests_failed,
            stream_messages_sent: stream.messages_sent,
            stream_latency_ms: stream.avg_latency_ms,
            firmware_version: self.config.device.firmware_version.clone(),
        }
    }

    fn heartbeat(&self) -> Heartbeat {
        let (status, error_message) = match self.state() {
            SupervisorState::Degraded => (HeartbeatStatus::Error, self.last_error.clone()),
            SupervisorState::Restarting => (HeartbeatStatus::Offline, self.last_error.clone()),
            _ => (HeartbeatStatus::Online, None),
        };

        Heartbeat {
            status,
            timestamp_us: self.clock.now_us(),
            uptime_sec: self.probe.uptime_sec(),
            ip_address: self.probe.ip_address(),
            wifi_rssi: self.probe.wifi_rssi(),
            error_message,
        }
    }

    /// Publish metrics, over HTTP when enabled, else over the stream
    async fn publish_metrics(&mut self) -> Result<()> {
        let metrics = self.metrics_snapshot();
        match (&self.http, &self.stream) {
            (Some(http), _) => http.send_metrics(&metrics).await?,
            (None, Some(stream)) => stream.send_metrics(&metrics)?,
            (None, None) => return Err(TelemetryError::NotConnected),
        }
        self.stats.metrics_published += 1;
        Ok(())
    }

    async fn publish_heartbeat(&mut self) -> Result<()> {
        let heartbeat = self.heartbeat();
        match (&self.http, &self.stream) {
            (Some(http), _) => http.send_heartbeat(&heartbeat).await?,
            (None, Some(stream)) => stream.send_heartbeat(&heartbeat)?,
            (None, None) => return Err(TelemetryError::NotConnected),
        }
        self.stats.heartbeats_sent += 1;
        Ok(())
    }

    /// One best-effort attempt; the outcome is only logged
    async fn send_alert_once(&self, alert: &Alert) {
        let result = match (&self.http, &self.stream) {
            (Some(http), _) => http.send_json(Endpoint::Alert, alert, 1).await,
            (None, Some(stream)) => stream.send_alert(alert),
            (None, None) => Err(TelemetryError::NotConnected),
        };
        if let Err(e) = result {
            warn!("Critical alert not delivered: {}", e);
        }
    }

    fn spawn_update_check(&mut self) {
        let Some(trigger) = self.update.clone() else {
            return;
        };
        self.stats.update_checks += 1;
        tokio::spawn(async move {
            match trigger.check_now().await {
                Ok(true) => info!("Firmware update available"),
                Ok(false) => debug!("Firmware is up to date"),
                Err(e) => warn!("Update check failed: {}", e),
            }
        });
    }

    /// Enter Restarting, wait `grace`, then restart once
    async fn restart_after(&mut self, grace: Duration, reason: &str) {
        self.set_state(SupervisorState::Restarting);
        sleep(grace).await;
        self.discard_batch("restarting");
        error!("Requesting device restart: {}", reason);
        self.restart.restart(reason);
    }

    async fn handle_control(&mut self, text: &str) -> Result<()> {
        match ControlMessage::parse(text)? {
            ControlMessage::Command(cmd) => self.handle_command(cmd.command, &cmd.params).await,
            ControlMessage::Config(update) => self.apply_remote_config(&update).map(|_| ()),
        }
    }

    /// Run a remote command
    ///
    /// # Errors
    ///
    /// `Unsupported` if the command has no registered or built-in handler
    pub async fn handle_command(&mut self, command: RemoteCommand, params: &Value) -> Result<()> {
        info!("Remote command: {}", command);
        if self.dispatcher.is_registered(command) {
            return self.dispatcher.dispatch(command, params).await;
        }

        match command {
            RemoteCommand::GetStatus => self.publish_heartbeat().await,
            RemoteCommand::Restart => {
                self.restart_after(REMOTE_RESTART_GRACE, "remote restart command").await;
                Ok(())
            }
            other => Err(TelemetryError::Unsupported(format!("command '{}'", other))),
        }
    }

    /// Merge, validate, save and apply a remote configuration update
    ///
    /// Channel settings are saved but take effect only after a restart.
    pub fn apply_remote_config(&mut self, update: &RemoteConfigUpdate) -> Result<ConfigChange> {
        let change = match &self.config_store {
            Some(store) => update.apply_and_save(&self.config, store.as_ref())?,
            None => {
                warn!("No configuration store, remote update applies until restart only");
                update.apply(&self.config)?
            }
        };

        if let (Some(rate), Some(stream)) = (change.stream_rate_hz, &self.stream) {
            stream.set_streaming_mode(stream.is_streaming(), rate)?;
        }
        if let Some(batch_size) = change.batch_size {
            self.flush_batch();
            self.batch_size = batch_size;
        }
        if change.restart_required {
            warn!("Configuration saved; channel settings apply after restart");
        }

        self.config = change.config.clone();
        Ok(change)
    }
}
