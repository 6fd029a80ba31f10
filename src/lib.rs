//! Content event pipeline
//!
//! The content service publishes domain events to a topic; the analytics
//! service consumes them into an in-process event log and serves queries and
//! aggregates over it. Broker outages are retried on a fixed timer and never
//! surface to HTTP callers.

pub mod api;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod messaging;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
