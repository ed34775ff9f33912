//! AWS-oriented adapters and handlers for signup greeting delivery.
//!
//! This crate owns runtime integration details (the Lambda handler, the user
//! store and notification transport boundaries, and delivery retries) on top
//! of the deterministic domain logic in `signup_core`.

pub mod adapters;
pub mod handlers;
pub mod notify;
