//! Wire protocol between the debug server and the device runtime.
//!
//! Inbound frames are JSON objects tagged by `type` with the payload in
//! `parameter`:
//!
//! ```text
//! {"type": "connect", "parameter": {"platform": "android", "model": "Pixel 8"}}
//! {"type": "log", "parameter": {"level": "info", "message": "hello"}}
//! {"type": "action-response", "parameter": {...}}
//! ```
//!
//! Outbound traffic is raw command strings evaluated by the runtime.

use serde::{Deserialize, Serialize};

/// Close code for normal, operator-initiated closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when a heartbeat probe went unanswered.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code for a connection superseded by a newer session.
pub const CLOSE_OUTDATED: u16 = 4900;

/// Device descriptor sent by the runtime in its `connect` message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Platform name (e.g. "android", "ios").
    #[serde(default)]
    pub platform: String,
    /// Device model string.
    #[serde(default)]
    pub model: String,
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", content = "parameter", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// First message of a session, describing the device.
    Connect(Device),
    /// A console log record, forwarded verbatim.
    Log(serde_json::Value),
    /// Result of a command previously sent to the runtime.
    ActionResponse(serde_json::Value),
}

/// Error parsing an inbound frame.
#[derive(Debug, thiserror::Error)]
#[error("malformed client message: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
