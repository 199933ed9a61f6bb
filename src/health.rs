//! Point-in-time health snapshots shared by all components.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Derived health verdict; recomputed on every call, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl HealthStatus {
    pub fn healthy(details: Map<String, Value>) -> Self {
        Self {
            healthy: true,
            last_check: Utc::now(),
            error: None,
            details: Some(details),
        }
    }

    pub fn unhealthy(error: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            healthy: false,
            last_check: Utc::now(),
            error: Some(error.into()),
            details: Some(details),
        }
    }

    /// Build from a verdict, attaching `error` only when unhealthy
    pub fn from_check(healthy: bool, error: impl Into<String>, details: Map<String, Value>) -> Self {
        if healthy {
            Self::healthy(details)
        } else {
            Self::unhealthy(error, details)
        }
    }
}
