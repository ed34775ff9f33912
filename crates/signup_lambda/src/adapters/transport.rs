use serde::{Deserialize, Serialize};

/// What the transport observed from the notification endpoint. An HTTP error
/// status lands here as a normal response for the caller to inspect; only
/// transport-level failures (connect, timeout, interrupt) use the `Err` side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound "POST JSON, await response" capability.
pub trait NotificationTransport {
    fn post_json(&self, body: &str) -> Result<TransportResponse, String>;
}
