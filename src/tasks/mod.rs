//! Background maintenance tasks owned by the service.
//!
//! Each task runs until it receives on its shutdown broadcast. The first interval
//! tick is skipped so nothing fires at spawn time.

mod metrics_tick;
mod queue_processor;
mod room_cleanup;

pub use metrics_tick::MetricsTickTask;
pub use queue_processor::QueueProcessorTask;
pub use room_cleanup::RoomCleanupTask;
