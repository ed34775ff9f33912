//! Retrying delivery of the greeting payload to the notification endpoint.

use std::thread;
use std::time::Duration;

use serde_json::json;

use crate::adapters::transport::{NotificationTransport, TransportResponse};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Fixed-delay retry budget for one delivery. The backoff is deliberately
/// not exponential; a fixed number of evenly spaced attempts is the
/// observable contract the notification endpoint was tuned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Every attempt failed at the transport level.
    Exhausted { attempts: usize },
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Exhausted { attempts } => {
                write!(f, "Failed to send notification after {attempts} retries")
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Send `payload`, retrying transport failures with a fixed sleep between
/// attempts. An HTTP error response is handed back to the caller as a
/// response to inspect, never a retry trigger. Exhausting the budget is
/// fatal for the invocation.
pub fn deliver(
    payload: &str,
    transport: &dyn NotificationTransport,
    policy: &RetryPolicy,
) -> Result<TransportResponse, DeliveryError> {
    for attempt in 1..=policy.max_attempts {
        match transport.post_json(payload) {
            Ok(response) => {
                log_notify_info(
                    "greeting_response",
                    json!({
                        "attempt": attempt,
                        "response": response,
                    }),
                );
                return Ok(response);
            }
            Err(error) => {
                log_notify_error(
                    "greeting_send_failed",
                    json!({
                        "attempt": attempt,
                        "max_attempts": policy.max_attempts,
                        "error": error,
                    }),
                );
            }
        }

        if attempt < policy.max_attempts && !policy.backoff.is_zero() {
            thread::sleep(policy.backoff);
        }
    }

    Err(DeliveryError::Exhausted {
        attempts: policy.max_attempts,
    })
}

fn log_notify_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "notifier",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_notify_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "notifier",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
