mod settings;

pub use settings::{
    ConnectionConfig, EventsConfig, ListenerCapacity, MetricsConfig, OtelConfig, QueueConfig,
    RoomsConfig, Settings, TransportConfig,
};
