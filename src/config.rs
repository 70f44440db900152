//! # Configuration Module
//!
//! Handles loading, validating and persisting configuration as TOML.
//!
//! Identity, URL and token fields are length-checked at load time and
//! rejected when too long; nothing is silently truncated.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};
use crate::wire::payload::sizing_batch_len;
use crate::wire::{HEADER_SIZE, MAX_BATCH_SAMPLES, MAX_PAYLOAD_SIZE};

/// Longest accepted device id in bytes
pub const MAX_DEVICE_ID_LEN: usize = 63;

/// Longest accepted server URL in bytes
pub const MAX_URL_LEN: usize = 255;

/// Longest accepted auth token in bytes
pub const MAX_TOKEN_LEN: usize = 127;

/// Longest accepted firmware version string in bytes
pub const MAX_FIRMWARE_VERSION_LEN: usize = 31;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub device: DeviceConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    pub device_id: String,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
}

/// Request/response channel configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub compress_data: bool,
}

/// Streaming channel configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_keepalive_interval_sec")]
    pub keepalive_interval_sec: u64,

    #[serde(default = "default_enabled")]
    pub auto_reconnect: bool,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default)]
    pub buffer_while_disconnected: bool,

    #[serde(default = "default_max_framing_errors")]
    pub max_framing_errors: u32,
}

/// Supervisor loop configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SupervisorConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_stats_interval_sec")]
    pub stats_interval_sec: u64,

    #[serde(default = "default_metrics_interval_sec")]
    pub metrics_interval_sec: u64,

    #[serde(default = "default_heartbeat_interval_sec")]
    pub heartbeat_interval_sec: u64,

    #[serde(default = "default_update_check_interval_sec")]
    pub update_check_interval_sec: u64,

    #[serde(default)]
    pub auto_update: bool,

    #[serde(default = "default_low_heap_threshold_bytes")]
    pub low_heap_threshold_bytes: u32,

    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,

    #[serde(default = "default_enabled")]
    pub streaming_enabled: bool,

    #[serde(default = "default_stream_rate_hz")]
    pub stream_rate_hz: u16,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_flush_ms")]
    pub batch_flush_ms: u64,

    #[serde(default = "default_sample_queue_capacity")]
    pub sample_queue_capacity: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_firmware_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_enabled() -> bool { true }

fn default_http_timeout_ms() -> u64 { 5000 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 200 }

fn default_reconnect_timeout_ms() -> u64 { 5000 }
fn default_connect_timeout_ms() -> u64 { 10000 }
fn default_keepalive_interval_sec() -> u64 { 30 }
fn default_buffer_size() -> usize { 16384 }
fn default_max_framing_errors() -> u32 { 3 }

fn default_tick_ms() -> u64 { 100 }
fn default_stats_interval_sec() -> u64 { 30 }
fn default_metrics_interval_sec() -> u64 { 300 }
fn default_heartbeat_interval_sec() -> u64 { 60 }
fn default_update_check_interval_sec() -> u64 { 300 }
fn default_low_heap_threshold_bytes() -> u32 { 10000 }
fn default_restart_grace_ms() -> u64 { 5000 }
fn default_stream_rate_hz() -> u16 { 100 }
fn default_batch_size() -> usize { 10 }
fn default_batch_flush_ms() -> u64 { 1000 }
fn default_sample_queue_capacity() -> usize { 64 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            server_url: String::new(),
            auth_token: None,
            timeout_ms: default_http_timeout_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            compress_data: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            server_url: String::new(),
            auth_token: None,
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            keepalive_interval_sec: default_keepalive_interval_sec(),
            auto_reconnect: default_enabled(),
            buffer_size: default_buffer_size(),
            buffer_while_disconnected: false,
            max_framing_errors: default_max_framing_errors(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            stats_interval_sec: default_stats_interval_sec(),
            metrics_interval_sec: default_metrics_interval_sec(),
            heartbeat_interval_sec: default_heartbeat_interval_sec(),
            update_check_interval_sec: default_update_check_interval_sec(),
            auto_update: false,
            low_heap_threshold_bytes: default_low_heap_threshold_bytes(),
            restart_grace_ms: default_restart_grace_ms(),
            streaming_enabled: default_enabled(),
            stream_rate_hz: default_stream_rate_hz(),
            batch_size: default_batch_size(),
            batch_flush_ms: default_batch_flush_ms(),
            sample_queue_capacity: default_sample_queue_capacity(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> TelemetryError {
    TelemetryError::Config(msg.into())
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}

fn check_len(name: &str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(invalid(format!(
            "{} is {} bytes, maximum is {}",
            name,
            value.len(),
            max
        )));
    }
    Ok(())
}

fn check_url(name: &str, url: &str, schemes: &[&str]) -> Result<()> {
    if url.is_empty() {
        return Err(invalid(format!("{} cannot be empty when enabled", name)));
    }
    check_len(name, url, MAX_URL_LEN)?;
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(invalid(format!("{} must start with one of: {}", name, schemes.join(", "))));
    }
    Ok(())
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(invalid("device_id cannot be empty"));
        }
        check_len("device_id", &self.device_id, MAX_DEVICE_ID_LEN)?;
        if self.device_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(invalid("device_id cannot contain whitespace or control characters"));
        }
        check_len("firmware_version", &self.firmware_version, MAX_FIRMWARE_VERSION_LEN)?;
        Ok(())
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        check_url("http.server_url", &self.server_url, &["http://", "https://"])?;
        if let Some(token) = &self.auth_token {
            check_len("http.auth_token", token, MAX_TOKEN_LEN)?;
        }
        check_range("http.timeout_ms", self.timeout_ms, 1, 60000)?;
        check_range("http.retry_count", self.retry_count as u64, 1, 10)?;
        check_range("http.retry_backoff_ms", self.retry_backoff_ms, 0, 10000)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        check_url("stream.server_url", &self.server_url, &["ws://", "wss://"])?;
        if let Some(token) = &self.auth_token {
            check_len("stream.auth_token", token, MAX_TOKEN_LEN)?;
        }
        check_range("stream.reconnect_timeout_ms", self.reconnect_timeout_ms, 100, 300000)?;
        check_range("stream.connect_timeout_ms", self.connect_timeout_ms, 1, 60000)?;
        check_range("stream.keepalive_interval_sec", self.keepalive_interval_sec, 1, 3600)?;
        check_range("stream.buffer_size", self.buffer_size as u64, 256, 1 << 20)?;
        if self.max_framing_errors == 0 {
            return Err(invalid("stream.max_framing_errors must be greater than 0"));
        }
        Ok(())
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_sec)
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("supervisor.tick_ms", self.tick_ms, 10, 10000)?;
        for (name, value) in [
            ("supervisor.stats_interval_sec", self.stats_interval_sec),
            ("supervisor.metrics_interval_sec", self.metrics_interval_sec),
            ("supervisor.heartbeat_interval_sec", self.heartbeat_interval_sec),
            ("supervisor.update_check_interval_sec", self.update_check_interval_sec),
        ] {
            check_range(name, value, 1, 86400)?;
        }
        check_range("supervisor.restart_grace_ms", self.restart_grace_ms, 0, 60000)?;
        check_range("supervisor.stream_rate_hz", self.stream_rate_hz as u64, 1, 1000)?;
        check_range("supervisor.batch_size", self.batch_size as u64, 1, MAX_BATCH_SAMPLES as u64)?;
        check_range("supervisor.batch_flush_ms", self.batch_flush_ms, 1, 60000)?;
        let capacity = self.sample_queue_capacity as u64;
        check_range("supervisor.sample_queue_capacity", capacity, 1, 4096)?;
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Config {
    /// Build a configuration with defaults for everything except identity
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device: DeviceConfig {
                device_id: device_id.into(),
                firmware_version: default_firmware_version(),
            },
            http: HttpConfig::default(),
            stream: StreamConfig::default(),
            supervisor: SupervisorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use csi_telemetry::config::Config;
    ///
    /// let config = Config::load("config/node.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::parse(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, disabling subsystems whose section is invalid
    ///
    /// A bad `[device]` section is still fatal. A bad `[http]` or `[stream]`
    /// section disables that channel; a bad `[supervisor]` section falls back
    /// to defaults. Returns the configuration and the list of problems found.
    pub fn load_lenient<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<TelemetryError>)> {
        let mut config = Self::parse(&fs::read_to_string(path)?)?;
        let mut problems = Vec::new();

        config.device.validate()?;

        if let Err(e) = config.http.validate() {
            warn!("Disabling HTTP channel: {}", e);
            config.http.enabled = false;
            problems.push(e);
        }
        if let Err(e) = config.stream.validate() {
            warn!("Disabling stream channel: {}", e);
            config.stream.enabled = false;
            problems.push(e);
        }
        if let Err(e) = config.supervisor.validate() {
            warn!("Using default supervisor settings: {}", e);
            config.supervisor = SupervisorConfig::default();
            problems.push(e);
        }

        Ok((config, problems))
    }

    /// Parse TOML without validating
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first field that is out of range
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;
        self.http.validate()?;
        self.stream.validate()?;
        self.supervisor.validate()?;

        if !self.http.enabled && !self.stream.enabled {
            return Err(invalid("at least one of http or stream must be enabled"));
        }

        if self.stream.enabled {
            // Every frame must fit the send buffer on its own
            let overhead = self.device.device_id.len() + HEADER_SIZE;
            if overhead >= self.stream.buffer_size {
                return Err(invalid("stream.buffer_size too small for frame header and device_id"));
            }

            let payload_limit = (self.stream.buffer_size - overhead).min(MAX_PAYLOAD_SIZE);
            let batch_len = sizing_batch_len(self.supervisor.batch_size);
            if self.supervisor.batch_size > 1 && batch_len > payload_limit {
                return Err(invalid(format!(
                    "supervisor.batch_size {} needs {} bytes per frame, \
                     stream.buffer_size allows {}",
                    self.supervisor.batch_size, batch_len, payload_limit
                )));
            }
        }

        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Persistence collaborator for configuration
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config>;
    fn save(&self, config: &Config) -> Result<()>;
}

/// TOML file implementation of [`ConfigStore`]
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlFileStore {
    fn load(&self) -> Result<Config> {
        Config::load(&self.path)
    }

    /// Validate, then write through a temporary file and rename
    fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        let contents = config.to_toml()?;

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> Config {
        let mut config = Config::with_device_id("esp32-csi-01");
        config.http.server_url = "http://192.168.1.100:3000".to_string();
        config.stream.server_url = "ws://192.168.1.100:3000".to_string();
        config
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_file = write_temp(
            r#"
[device]
device_id = "node-kitchen"

[http]
server_url = "https://collector.local"
auth_token = "secret"
retry_count = 5

[stream]
server_url = "wss://collector.local"
auto_reconnect = false

[supervisor]
batch_size = 25
"#,
        );

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.device.device_id, "node-kitchen");
        assert_eq!(config.http.retry_count, 5);
        assert_eq!(config.http.auth_token.as_deref(), Some("secret"));
        assert!(!config.stream.auto_reconnect);
        assert_eq!(config.stream.reconnect_timeout_ms, 5000);
        assert_eq!(config.supervisor.batch_size, 25);
        assert_eq!(config.supervisor.tick_ms, 100);
    }

    #[test]
    fn test_missing_device_section_fails_parse() {
        let temp_file = write_temp("[http]\nserver_url = \"http://x\"\n");
        assert!(matches!(Config::load(temp_file.path()), Err(TelemetryError::ConfigParse(_))));
    }

    #[test]
    fn test_empty_device_id() {
        let mut config = create_valid_config();
        config.device.device_id = String::new();
        assert!(matches!(config.validate(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_device_id_too_long_fails_instead_of_truncating() {
        let mut config = create_valid_config();
        config.device.device_id = "n".repeat(MAX_DEVICE_ID_LEN + 1);
        match config.validate() {
            Err(TelemetryError::Config(msg)) => assert!(msg.contains("device_id")),
            other => panic!("Expected Config error, got {:?}", other),
        }

        config.device.device_id = "n".repeat(MAX_DEVICE_ID_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_id_with_whitespace() {
        let mut config = create_valid_config();
        config.device.device_id = "node 1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url_too_long() {
        let mut config = create_valid_config();
        config.http.server_url = format!("http://{}", "a".repeat(MAX_URL_LEN));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_too_long() {
        let mut config = create_valid_config();
        config.stream.auth_token = Some("t".repeat(MAX_TOKEN_LEN + 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url_scheme_checked() {
        let mut config = create_valid_config();
        config.stream.server_url = "http://wrong-scheme".to_string();
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.http.server_url = "ws://wrong-scheme".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_channel_skips_url_check() {
        let mut config = create_valid_config();
        config.stream.enabled = false;
        config.stream.server_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_both_channels_disabled() {
        let mut config = create_valid_config();
        config.stream.enabled = false;
        config.http.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_count_bounds() {
        let mut config = create_valid_config();
        config.http.retry_count = 0;
        assert!(config.validate().is_err());
        config.http.retry_count = 11;
        assert!(config.validate().is_err());
        config.http.retry_count = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = create_valid_config();
        config.http.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.http.timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_rate_bounds() {
        for (rate, ok) in [(0u16, false), (1, true), (1000, true), (1001, false)] {
            let mut config = create_valid_config();
            config.supervisor.stream_rate_hz = rate;
            assert_eq!(config.validate().is_ok(), ok, "rate {}", rate);
        }
    }

    #[test]
    fn test_batch_size_bounds() {
        for (size, ok) in [(0usize, false), (1, true), (50, true), (51, false)] {
            let mut config = create_valid_config();
            config.stream.buffer_size = 64 * 1024;
            config.supervisor.batch_size = size;
            assert_eq!(config.validate().is_ok(), ok, "batch size {}", size);
        }
    }

    #[test]
    fn test_batch_size_must_fit_stream_frame() {
        let mut config = create_valid_config();
        config.supervisor.batch_size = 29;
        assert!(config.validate().is_ok());

        config.supervisor.batch_size = 50;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("supervisor.batch_size 50"), "{}", err);

        // Only the stream carries batches
        config.stream.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_size_bounds() {
        let mut config = create_valid_config();
        config.stream.buffer_size = 255;
        assert!(config.validate().is_err());
        config.stream.buffer_size = (1 << 20) + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_framing_errors_zero() {
        let mut config = create_valid_config();
        config.stream.max_framing_errors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_lenient_disables_bad_stream_section() {
        let temp_file = write_temp(
            r#"
[device]
device_id = "node-2"

[http]
server_url = "http://collector.local"

[stream]
server_url = "http://not-a-websocket"
"#,
        );

        let (config, problems) = Config::load_lenient(temp_file.path()).unwrap();
        assert!(config.http.enabled);
        assert!(!config.stream.enabled);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn test_load_lenient_bad_device_is_fatal() {
        let temp_file = write_temp("[device]\ndevice_id = \"\"\n");
        assert!(Config::load_lenient(temp_file.path()).is_err());
    }

    #[test]
    fn test_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("node.toml"));

        let mut config = create_valid_config();
        config.supervisor.stream_rate_hz = 250;
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, config);
        assert!(!dir.path().join("node.toml.tmp").exists());
    }

    #[test]
    fn test_store_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("node.toml"));

        let mut config = create_valid_config();
        config.http.retry_count = 0;
        assert!(store.save(&config).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_duration_helpers() {
        let config = create_valid_config();
        assert_eq!(config.http.timeout(), Duration::from_millis(5000));
        assert_eq!(config.stream.reconnect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.stream.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.supervisor.tick(), Duration::from_millis(100));
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_http_timeout_ms(), 5000);
        assert_eq!(default_retry_count(), 3);
        assert_eq!(default_reconnect_timeout_ms(), 5000);
        assert_eq!(default_keepalive_interval_sec(), 30);
        assert_eq!(default_tick_ms(), 100);
        assert_eq!(default_stats_interval_sec(), 30);
        assert_eq!(default_metrics_interval_sec(), 300);
        assert_eq!(default_update_check_interval_sec(), 300);
        assert_eq!(default_low_heap_threshold_bytes(), 10000);
        assert_eq!(default_restart_grace_ms(), 5000);
        assert_eq!(default_batch_size(), 10);
    }
}
