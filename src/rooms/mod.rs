//! Room (subscription scope) tracking.
//!
//! The tracker keeps one [`RoomState`] per room the client has joined, including
//! rooms it has since left, and pushes join/leave/broadcast intents through a
//! [`RoomEmitter`].

mod tracker;

pub use tracker::{RoomStats, RoomTracker};

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Tracked state of one room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomState {
    pub room_id: String,
    pub joined_at: DateTime<Utc>,
    pub member_count: u32,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
}

impl RoomState {
    fn new(room_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.to_string(),
            joined_at: now,
            member_count: 1,
            last_activity: now,
            active: true,
        }
    }
}

/// Outbound room operation
#[derive(Debug, Clone, PartialEq)]
pub enum RoomIntent {
    Join { room_id: String },
    Leave { room_id: String },
    Broadcast { room_id: String, event: String, data: Value },
}

impl RoomIntent {
    pub fn room_id(&self) -> &str {
        match self {
            RoomIntent::Join { room_id }
            | RoomIntent::Leave { room_id }
            | RoomIntent::Broadcast { room_id, .. } => room_id,
        }
    }
}

/// Room-scoped events pushed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomServerEvent {
    UserJoined,
    UserLeft,
    /// Carries `memberCount`
    RoomUpdated,
    RoomMessage,
}

impl RoomServerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomServerEvent::UserJoined => "user_joined",
            RoomServerEvent::UserLeft => "user_left",
            RoomServerEvent::RoomUpdated => "room_updated",
            RoomServerEvent::RoomMessage => "room_message",
        }
    }
}

impl FromStr for RoomServerEvent {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_joined" => Ok(RoomServerEvent::UserJoined),
            "user_left" => Ok(RoomServerEvent::UserLeft),
            "room_updated" => Ok(RoomServerEvent::RoomUpdated),
            "room_message" => Ok(RoomServerEvent::RoomMessage),
            other => Err(RoomError::UnknownServerEvent(other.to_string())),
        }
    }
}

/// Room errors
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    #[error("Room id must not be empty")]
    InvalidRoomId,

    #[error("Room emitter failed: {0}")]
    EmitterFailed(String),

    #[error("Unknown room event: {0}")]
    UnknownServerEvent(String),
}

/// Sink for room intents
pub trait RoomEmitter: Send + Sync {
    fn emit(&self, intent: &RoomIntent) -> Result<(), RoomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_names() {
        for event in [
            RoomServerEvent::UserJoined,
            RoomServerEvent::UserLeft,
            RoomServerEvent::RoomUpdated,
            RoomServerEvent::RoomMessage,
        ] {
            assert_eq!(event.as_str().parse::<RoomServerEvent>().unwrap(), event);
        }
        assert!(matches!(
            "rideRequest".parse::<RoomServerEvent>(),
            Err(RoomError::UnknownServerEvent(_))
        ));
    }
}
