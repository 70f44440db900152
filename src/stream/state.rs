//! Connection state and lifecycle events

use std::fmt;
use std::time::Duration;

/// Streaming connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal for a channel instance
    Closed,
}

impl ChannelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle notification queued for the supervisor task
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged { from: ChannelState, to: ChannelState },
    Connected,
    Disconnected { reason: String },
    Error(String),
    FramingError(String),
    BufferOverflow { frame_len: usize },
    PongReceived { latency: Duration },
    /// Text frame from the server, parsed by the supervisor
    Control(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_closed_is_terminal() {
        assert!(ChannelState::Closed.is_terminal());
        for state in [
            ChannelState::Disconnected,
            ChannelState::Connecting,
            ChannelState::Connected,
            ChannelState::Reconnecting,
        ] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ChannelState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ChannelState::Connected.to_string(), "connected");
    }
}
