//! Remote configuration updates
//!
//! Only a fixed set of keys may be changed remotely. Unknown keys reject
//! the whole update. A merged configuration is validated before it is saved.

use serde::Deserialize;

use crate::config::{Config, ConfigStore};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevicePatch {
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpPatch {
    pub server_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamPatch {
    pub server_url: Option<String>,
    pub reconnect_timeout_ms: Option<u64>,
    pub keepalive_interval_sec: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorPatch {
    pub stream_rate_hz: Option<u16>,
    pub batch_size: Option<usize>,
}

/// Partial configuration sent by the collection service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfigUpdate {
    pub device: Option<DevicePatch>,
    pub http: Option<HttpPatch>,
    pub stream: Option<StreamPatch>,
    pub supervisor: Option<SupervisorPatch>,
}

/// Result of merging an update
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub config: Config,

    /// Identity or channel settings changed; they take effect after restart
    pub restart_required: bool,

    /// New rate to apply at once
    pub stream_rate_hz: Option<u16>,

    /// New batch size to apply at once
    pub batch_size: Option<usize>,
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl RemoteConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge into a copy of `current` and validate it
    pub fn apply(&self, current: &Config) -> Result<ConfigChange> {
        let mut config = current.clone();

        if let Some(device) = &self.device {
            set(&mut config.device.device_id, &device.device_id);
        }
        if let Some(http) = &self.http {
            set(&mut config.http.server_url, &http.server_url);
            set(&mut config.http.timeout_ms, &http.timeout_ms);
            set(&mut config.http.retry_count, &http.retry_count);
        }
        if let Some(stream) = &self.stream {
            set(&mut config.stream.server_url, &stream.server_url);
            set(&mut config.stream.reconnect_timeout_ms, &stream.reconnect_timeout_ms);
            set(&mut config.stream.keepalive_interval_sec, &stream.keepalive_interval_sec);
        }
        if let Some(supervisor) = &self.supervisor {
            set(&mut config.supervisor.stream_rate_hz, &supervisor.stream_rate_hz);
            set(&mut config.supervisor.batch_size, &supervisor.batch_size);
        }

        config.validate()?;

        let restart_required = config.device != current.device
            || config.http != current.http
            || config.stream != current.stream;

        let stream_rate_hz = Some(config.supervisor.stream_rate_hz)
            .filter(|r| *r != current.supervisor.stream_rate_hz);
        let batch_size =
            Some(config.supervisor.batch_size).filter(|b| *b != current.supervisor.batch_size);

        Ok(ConfigChange {
            config,
            restart_required,
            stream_rate_hz,
            batch_size,
        })
    }

    /// Merge, validate and persist
    pub fn apply_and_save(
        &self,
        current: &Config,
        store: &dyn ConfigStore,
    ) -> Result<ConfigChange> {
        let change = self.apply(current)?;
        store.save(&change.config)?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TomlFileStore;
    use crate::error::TelemetryError;

    fn base_config() -> Config {
        let mut config = Config::with_device_id("node-3");
        config.http.server_url = "http://collector.local".to_string();
        config.stream.server_url = "ws://collector.local".to_string();
        config
    }

    fn parse(json: &str) -> RemoteConfigUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_rate_change_applies_live() {
        let change =
            parse(r#"{"supervisor":{"stream_rate_hz":20}}"#).apply(&base_config()).unwrap();
        assert_eq!(change.stream_rate_hz, Some(20));
        assert_eq!(change.batch_size, None);
        assert!(!change.restart_required);
        assert_eq!(change.config.supervisor.stream_rate_hz, 20);
    }

    #[test]
    fn test_channel_change_requires_restart() {
        let text = r#"{"http":{"retry_count":5},"stream":{"server_url":"wss://other.local"}}"#;
        let change = parse(text).apply(&base_config()).unwrap();
        assert!(change.restart_required);
        assert_eq!(change.config.http.retry_count, 5);
        assert_eq!(change.config.stream.server_url, "wss://other.local");
        assert_eq!(change.stream_rate_hz, None);
    }

    #[test]
    fn test_same_values_change_nothing() {
        let change = parse(r#"{"device":{"device_id":"node-3"}}"#).apply(&base_config()).unwrap();
        assert!(!change.restart_required);
        assert_eq!(change.config, base_config());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        for text in [r#"{"logging":{"log_dir":"/tmp"}}"#, r#"{"http":{"auth_token":"x"}}"#] {
            assert!(serde_json::from_str::<RemoteConfigUpdate>(text).is_err(), "{}", text);
        }
    }

    #[test]
    fn test_invalid_merge_rejected() {
        let result = parse(r#"{"supervisor":{"batch_size":80}}"#).apply(&base_config());
        assert!(matches!(result, Err(TelemetryError::Config(_))));

        let result = parse(r#"{"device":{"device_id":""}}"#).apply(&base_config());
        assert!(result.is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(parse("{}").is_empty());
        assert!(!parse(r#"{"supervisor":{}}"#).is_empty());
    }

    #[test]
    fn test_apply_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("node.toml"));

        let change = parse(r#"{"http":{"timeout_ms":2500}}"#)
            .apply_and_save(&base_config(), &store)
            .unwrap();
        assert!(change.restart_required);
        assert_eq!(store.load().unwrap().http.timeout_ms, 2500);
    }
}
