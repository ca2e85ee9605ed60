//! Page → worker control channel.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::ServiceWorkerError;

/// Commands a page can send to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting worker now.
    SkipWaiting,
    /// Delete every cache, then acknowledge on the reply port.
    ClearCache,
}

impl ControlMessage {
    /// Parse message data. Anything that is not a known command is `None`.
    pub fn parse(data: &JsonValue) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Replies posted back to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    CacheCleared,
}

/// The worker's end of a transferred message port.
#[derive(Debug, Clone)]
pub struct ReplyPort {
    tx: mpsc::UnboundedSender<JsonValue>,
}

impl ReplyPort {
    /// Create a port and the page-side receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JsonValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post a reply as structured data.
    pub fn post(&self, reply: ControlReply) -> Result<(), ServiceWorkerError> {
        let data =
            serde_json::to_value(reply).map_err(|e| ServiceWorkerError::Message(e.to_string()))?;
        self.tx
            .send(data)
            .map_err(|_| ServiceWorkerError::Message("Reply port is closed".to_string()))
    }
}

/// A `message` event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: JsonValue,
    /// Transferred ports; the first one receives replies.
    pub ports: Vec<ReplyPort>,
}

impl MessageEvent {
    pub fn new(data: JsonValue) -> Self {
        Self {
            data,
            ports: Vec::new(),
        }
    }

    pub fn with_port(data: JsonValue, port: ReplyPort) -> Self {
        Self {
            data,
            ports: vec![port],
        }
    }

    pub fn reply_port(&self) -> Option<&ReplyPort> {
        self.ports.first()
    }
}
