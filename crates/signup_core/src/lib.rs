//! Shared signup greeting domain primitives.
//!
//! This crate owns deterministic pool maintenance, greeting selection, and
//! greeting composition. It intentionally excludes AWS SDK, Lambda runtime,
//! and HTTP transport concerns; those live in `crates/signup_lambda`.

pub mod greeting;
pub mod pool;
pub mod selection;
pub mod user;
