//! # Telemetry Module
//!
//! Data model shared by both transports and the supervisor.
//!
//! This module handles:
//! - CSI samples as produced by the external collector
//! - System metrics, heartbeat and alert records
//! - JSON documents posted to the collection service
//! - Lock-free statistics counters for the send and event paths

pub mod stats;
pub mod types;

pub use stats::{HttpCounters, HttpStats, StreamCounters, StreamStats};
pub use types::{
    Alert, AlertLevel, CsiDocument, CsiSample, Document, DocumentRef, Heartbeat, HeartbeatStatus,
    Position, SystemMetricsSnapshot,
};
