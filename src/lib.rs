//! # CSI Telemetry Library
//!
//! Ships WiFi channel-state samples and node health from a sensing node to a
//! collection service.
//!
//! Two uplinks are provided: a request/response channel for JSON documents
//! and a persistent binary streaming channel. A supervisor loop routes
//! samples, publishes metrics and heartbeats, and answers remote control
//! messages.

pub mod config;
pub mod error;
pub mod http;
pub mod sim;
pub mod stream;
pub mod supervisor;
pub mod telemetry;
pub mod wire;
