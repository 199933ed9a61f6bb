//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `backoff`: Exponential backoff for reconnection
//! - `config`: Configuration sections and loading
//! - `error`: Crate-level error type
//! - `metrics`: Prometheus metrics helpers

pub mod backoff;
pub mod config;
pub mod error;
pub mod metrics;
