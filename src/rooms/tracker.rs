use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::health::HealthStatus;
use crate::metrics::RoomMetrics;

use super::{RoomEmitter, RoomIntent, RoomServerEvent, RoomState};

#[derive(Debug, Default)]
struct RoomCounters {
    joins: AtomicU64,
    leaves: AtomicU64,
    emit_failures: AtomicU64,
    purged: AtomicU64,
}

/// Statistics about tracked rooms
#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub total_rooms: usize,
    pub active_rooms: usize,
    pub inactive_rooms: usize,
    pub total_members: u64,
    pub joins: u64,
    pub leaves: u64,
    pub emit_failures: u64,
    pub purged: u64,
}

/// Tracks joined rooms and pushes room intents to the server.
///
/// # Design
///
/// - Leaving a room only deactivates its entry; a later join reuses it
/// - State is updated even when the emitter fails; the call then returns `false`
/// - Inactive entries are purged by [`RoomTracker::cleanup_inactive`]
pub struct RoomTracker {
    rooms: DashMap<String, RoomState>,
    emitter: Arc<dyn RoomEmitter>,
    counters: RoomCounters,
}

impl RoomTracker {
    pub fn new(emitter: Arc<dyn RoomEmitter>) -> Self {
        Self {
            rooms: DashMap::new(),
            emitter,
            counters: RoomCounters::default(),
        }
    }

    /// Join a room. Joining an active room is a no-op.
    pub fn join(&self, room_id: &str) -> bool {
        if room_id.trim().is_empty() {
            tracing::warn!("Rejected join with empty room id");
            return false;
        }

        let now = Utc::now();
        let changed = match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let room = entry.get_mut();
                if room.active {
                    false
                } else {
                    room.active = true;
                    room.joined_at = now;
                    room.last_activity = now;
                    room.member_count = 1;
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(RoomState::new(room_id, now));
                true
            }
        };

        if !changed {
            tracing::debug!(room_id = %room_id, "Already in room");
            return true;
        }

        self.counters.joins.fetch_add(1, Ordering::Relaxed);
        RoomMetrics::set_active(self.active_count());
        tracing::info!(room_id = %room_id, "Joined room");

        self.emit(RoomIntent::Join {
            room_id: room_id.to_string(),
        })
    }

    /// Leave a room, keeping its entry as inactive
    pub fn leave(&self, room_id: &str) -> bool {
        let left = match self.rooms.get_mut(room_id) {
            Some(mut room) if room.active => {
                room.active = false;
                room.member_count = 0;
                room.last_activity = Utc::now();
                true
            }
            _ => false,
        };

        if !left {
            tracing::debug!(room_id = %room_id, "Not in room");
            return false;
        }

        self.counters.leaves.fetch_add(1, Ordering::Relaxed);
        RoomMetrics::set_active(self.active_count());
        tracing::info!(room_id = %room_id, "Left room");

        self.emit(RoomIntent::Leave {
            room_id: room_id.to_string(),
        })
    }

    /// Leave every active room, returning how many were left
    pub fn leave_all(&self) -> usize {
        let mut left = 0;
        for room_id in self.active_rooms() {
            if self.is_joined(&room_id) {
                self.leave(&room_id);
                left += 1;
            }
        }
        left
    }

    pub fn is_joined(&self, room_id: &str) -> bool {
        self.rooms.get(room_id).is_some_and(|room| room.active)
    }

    /// Send an event to a joined room
    pub fn broadcast(&self, room_id: &str, event: &str, data: Value) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(mut room) if room.active => room.last_activity = Utc::now(),
            _ => {
                tracing::warn!(room_id = %room_id, event = %event, "Broadcast to a room that is not joined");
                return false;
            }
        }

        self.emit(RoomIntent::Broadcast {
            room_id: room_id.to_string(),
            event: event.to_string(),
            data,
        })
    }

    /// Re-issue joins for every active room, after the connection was resumed
    pub fn rejoin_all(&self) -> usize {
        let rooms = self.active_rooms();
        let mut rejoined = 0;
        for room_id in &rooms {
            if self.emit(RoomIntent::Join {
                room_id: room_id.clone(),
            }) {
                rejoined += 1;
            }
        }

        if !rooms.is_empty() {
            tracing::info!(rooms = rooms.len(), rejoined, "Rejoined rooms");
        }
        rejoined
    }

    /// Apply a room event pushed by the server; only active rooms are updated
    pub fn handle_server_event(&self, kind: RoomServerEvent, room_id: &str, data: &Value) -> bool {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if !room.active {
            return false;
        }

        match kind {
            RoomServerEvent::UserJoined => room.member_count = room.member_count.saturating_add(1),
            RoomServerEvent::UserLeft => room.member_count = room.member_count.saturating_sub(1),
            RoomServerEvent::RoomUpdated => {
                if let Some(count) = data.get("memberCount").and_then(Value::as_u64) {
                    room.member_count = u32::try_from(count).unwrap_or(u32::MAX);
                }
            }
            RoomServerEvent::RoomMessage => {}
        }
        room.last_activity = Utc::now();

        tracing::debug!(
            room_id = %room_id,
            event = kind.as_str(),
            member_count = room.member_count,
            "Room event applied"
        );
        true
    }

    /// Purge inactive rooms whose last activity is older than `max_age`
    pub fn cleanup_inactive(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_inactive_before(cutoff)
    }

    fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.rooms.len();
        self.rooms
            .retain(|_, room| room.active || room.last_activity >= cutoff);
        let removed = before.saturating_sub(self.rooms.len());

        if removed > 0 {
            self.counters.purged.fetch_add(removed as u64, Ordering::Relaxed);
            RoomMetrics::record_purged(removed);
            tracing::info!(removed, remaining = self.rooms.len(), "Purged inactive rooms");
        }
        removed
    }

    pub fn room(&self, room_id: &str) -> Option<RoomState> {
        self.rooms.get(room_id).map(|room| room.clone())
    }

    /// Ids of active rooms, sorted
    pub fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .rooms
            .iter()
            .filter(|room| room.active)
            .map(|room| room.key().clone())
            .collect();
        rooms.sort();
        rooms
    }

    fn active_count(&self) -> usize {
        self.rooms.iter().filter(|room| room.active).count()
    }

    fn emit(&self, intent: RoomIntent) -> bool {
        match self.emitter.emit(&intent) {
            Ok(()) => true,
            Err(e) => {
                self.counters.emit_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(room_id = %intent.room_id(), error = %e, "Failed to emit room intent");
                false
            }
        }
    }

    pub fn stats(&self) -> RoomStats {
        // Single pass keeps total == active + inactive
        let mut active_rooms = 0;
        let mut inactive_rooms = 0;
        let mut total_members = 0u64;
        for room in self.rooms.iter() {
            if room.active {
                active_rooms += 1;
                total_members += u64::from(room.member_count);
            } else {
                inactive_rooms += 1;
            }
        }

        RoomStats {
            total_rooms: active_rooms + inactive_rooms,
            active_rooms,
            inactive_rooms,
            total_members,
            joins: self.counters.joins.load(Ordering::Relaxed),
            leaves: self.counters.leaves.load(Ordering::Relaxed),
            emit_failures: self.counters.emit_failures.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let stats = self.stats();

        let mut details = Map::new();
        details.insert("total_rooms".to_string(), json!(stats.total_rooms));
        details.insert("active_rooms".to_string(), json!(stats.active_rooms));
        details.insert("total_members".to_string(), json!(stats.total_members));
        details.insert("emit_failures".to_string(), json!(stats.emit_failures));

        HealthStatus::healthy(details)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use parking_lot::Mutex;

    use super::*;
    use crate::rooms::RoomError;

    #[derive(Default)]
    struct RecordingEmitter {
        intents: Mutex<Vec<RoomIntent>>,
        fail: AtomicBool,
    }

    impl RoomEmitter for RecordingEmitter {
        fn emit(&self, intent: &RoomIntent) -> Result<(), RoomError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(RoomError::EmitterFailed("queue full".to_string()));
            }
            self.intents.lock().push(intent.clone());
            Ok(())
        }
    }

    fn tracker() -> (RoomTracker, Arc<RecordingEmitter>) {
        let emitter = Arc::new(RecordingEmitter::default());
        (RoomTracker::new(emitter.clone()), emitter)
    }

    fn join_intent(room_id: &str) -> RoomIntent {
        RoomIntent::Join {
            room_id: room_id.to_string(),
        }
    }

    #[test]
    fn test_join_leave_join_reuses_entry() {
        let (tracker, emitter) = tracker();

        assert!(tracker.join("ride_42"));
        let first = tracker.room("ride_42").unwrap();
        assert!(first.active);
        assert_eq!(first.member_count, 1);

        // Second join is a no-op
        assert!(tracker.join("ride_42"));
        assert_eq!(tracker.room("ride_42").unwrap(), first);

        assert!(tracker.leave("ride_42"));
        let left = tracker.room("ride_42").unwrap();
        assert!(!left.active);
        assert_eq!(left.member_count, 0);

        assert!(tracker.join("ride_42"));
        let rejoined = tracker.room("ride_42").unwrap();
        assert!(rejoined.active);
        assert!(rejoined.joined_at >= first.joined_at);
        assert_eq!(tracker.stats().total_rooms, 1);

        assert_eq!(
            *emitter.intents.lock(),
            vec![
                join_intent("ride_42"),
                RoomIntent::Leave {
                    room_id: "ride_42".to_string()
                },
                join_intent("ride_42"),
            ]
        );
    }

    #[test]
    fn test_invalid_and_unknown_rooms() {
        let (tracker, emitter) = tracker();

        assert!(!tracker.join(""));
        assert!(!tracker.join("   "));
        assert!(!tracker.leave("nowhere"));

        tracker.join("ride_1");
        assert!(tracker.leave("ride_1"));
        assert!(!tracker.leave("ride_1"));

        assert_eq!(emitter.intents.lock().len(), 2);
    }

    #[test]
    fn test_emitter_failure_keeps_state() {
        let (tracker, emitter) = tracker();
        emitter.fail.store(true, Ordering::Relaxed);

        assert!(!tracker.join("ride_7"));

        assert!(tracker.is_joined("ride_7"));
        assert_eq!(tracker.stats().emit_failures, 1);
    }

    #[test]
    fn test_server_events_on_active_rooms() {
        let (tracker, _emitter) = tracker();
        tracker.join("ride_42");

        assert!(tracker.handle_server_event(RoomServerEvent::UserJoined, "ride_42", &Value::Null));
        assert!(tracker.handle_server_event(RoomServerEvent::UserJoined, "ride_42", &Value::Null));
        assert_eq!(tracker.room("ride_42").unwrap().member_count, 3);

        assert!(tracker.handle_server_event(RoomServerEvent::UserLeft, "ride_42", &Value::Null));
        assert_eq!(tracker.room("ride_42").unwrap().member_count, 2);

        assert!(tracker.handle_server_event(
            RoomServerEvent::RoomUpdated,
            "ride_42",
            &json!({"roomId": "ride_42", "memberCount": 7})
        ));
        assert_eq!(tracker.room("ride_42").unwrap().member_count, 7);

        tracker.leave("ride_42");
        assert!(!tracker.handle_server_event(RoomServerEvent::UserJoined, "ride_42", &Value::Null));
        assert!(!tracker.handle_server_event(RoomServerEvent::RoomMessage, "unknown", &Value::Null));
    }

    #[test]
    fn test_broadcast_requires_joined_room() {
        let (tracker, emitter) = tracker();

        assert!(!tracker.broadcast("ride_42", "etaUpdate", json!({"eta": 5})));

        tracker.join("ride_42");
        assert!(tracker.broadcast("ride_42", "etaUpdate", json!({"eta": 5})));

        assert_eq!(
            emitter.intents.lock().last(),
            Some(&RoomIntent::Broadcast {
                room_id: "ride_42".to_string(),
                event: "etaUpdate".to_string(),
                data: json!({"eta": 5}),
            })
        );
    }

    #[test]
    fn test_leave_all_and_rejoin_all() {
        let (tracker, emitter) = tracker();
        tracker.join("a");
        tracker.join("b");
        tracker.join("c");
        tracker.leave("c");
        emitter.intents.lock().clear();

        assert_eq!(tracker.rejoin_all(), 2);
        assert_eq!(*emitter.intents.lock(), vec![join_intent("a"), join_intent("b")]);

        assert_eq!(tracker.leave_all(), 2);
        assert!(tracker.active_rooms().is_empty());
        assert_eq!(tracker.stats().inactive_rooms, 3);
    }

    #[test]
    fn test_cleanup_purges_only_inactive() {
        let (tracker, _emitter) = tracker();
        tracker.join("active");
        tracker.join("stale");
        tracker.leave("stale");

        assert_eq!(tracker.cleanup_inactive(Duration::from_secs(3600)), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(tracker.purge_inactive_before(future), 1);
        assert!(tracker.room("stale").is_none());
        assert!(tracker.is_joined("active"));
        assert_eq!(tracker.stats().purged, 1);
    }

    #[test]
    fn test_stats_consistent_under_concurrent_joins() {
        let (tracker, _emitter) = tracker();
        tracker.join("ride_0");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    let room = format!("ride_{}", i % 50);
                    tracker.join(&room);
                    if i % 3 == 0 {
                        tracker.leave(&room);
                    }
                }
            });

            for _ in 0..500 {
                let stats = tracker.stats();
                assert_eq!(stats.total_rooms, stats.active_rooms + stats.inactive_rooms);
            }
        });

        let stats = tracker.stats();
        assert_eq!(stats.total_rooms, 50);
        assert_eq!(stats.total_rooms, stats.active_rooms + stats.inactive_rooms);
    }

    #[test]
    fn test_health_is_reported() {
        let (tracker, _emitter) = tracker();
        tracker.join("ride_42");

        let health = tracker.get_health_status();
        assert!(health.healthy);
        assert_eq!(health.details.unwrap()["active_rooms"], 1);
    }
}
