//! Remote control messages and command dispatch
//!
//! Control messages arrive as text frames on the stream channel and are
//! handled only on the supervisor task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::remote_config::RemoteConfigUpdate;
use crate::error::{Result, TelemetryError};

/// Commands the collection service may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    Restart,
    StartCsi,
    StopCsi,
    Calibrate,
    FactoryReset,
    GetStatus,
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteCommand::Restart => "restart",
            RemoteCommand::StartCsi => "start_csi",
            RemoteCommand::StopCsi => "stop_csi",
            RemoteCommand::Calibrate => "calibrate",
            RemoteCommand::FactoryReset => "factory_reset",
            RemoteCommand::GetStatus => "get_status",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandMessage {
    pub command: RemoteCommand,
    #[serde(default)]
    pub params: Value,
}

/// Parsed control message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Command(CommandMessage),
    Config(RemoteConfigUpdate),
}

impl ControlMessage {
    /// Parse a `{"type": "command" | "config", ...}` document
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the text is not a JSON object with a string `type`
    /// - `Unsupported` for an unknown `type`
    /// - `Json` if the body does not match its type
    pub fn parse(text: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(text).map_err(|e| {
            TelemetryError::InvalidArgument(format!("control message is not JSON: {}", e))
        })?;

        let kind = value
            .as_object_mut()
            .and_then(|fields| fields.remove("type"))
            .and_then(|kind| kind.as_str().map(str::to_string))
            .ok_or_else(|| {
                TelemetryError::InvalidArgument("control message has no type".to_string())
            })?;

        match kind.as_str() {
            "command" => Ok(ControlMessage::Command(serde_json::from_value(value)?)),
            "config" => Ok(ControlMessage::Config(serde_json::from_value(value)?)),
            other => Err(TelemetryError::Unsupported(format!("control message type '{}'", other))),
        }
    }
}

/// Business logic for one remote command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, params: &Value) -> Result<()>;
}

/// Routes commands to registered handlers
#[derive(Default, Clone)]
pub struct CommandDispatcher {
    handlers: HashMap<RemoteCommand, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the command
    pub fn register(&mut self, command: RemoteCommand, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(command, handler);
    }

    pub fn is_registered(&self, command: RemoteCommand) -> bool {
        self.handlers.contains_key(&command)
    }

    /// # Errors
    ///
    /// `Unsupported` if no handler is registered for `command`
    pub async fn dispatch(&self, command: RemoteCommand, params: &Value) -> Result<()> {
        let handler = self
            .handlers
            .get(&command)
            .ok_or_else(|| TelemetryError::Unsupported(format!("command '{}'", command)))?;
        handler.handle(params).await
    }
}
