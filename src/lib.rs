// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::backoff;
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Components
pub mod connection;
pub mod events;
pub mod health;
pub mod monitor;
pub mod queue;
pub mod rooms;
pub mod transport;

// Application layer
pub mod service;

// Supporting modules
pub mod tasks;
pub mod telemetry;

pub use error::{RealtimeError, Result};
pub use health::HealthStatus;
pub use service::{RealtimeService, ServiceStatus};
