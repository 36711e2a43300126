//! Matchmaker - assigns connections to rooms

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::game::{Room, RoomHandle, Tuning};

use super::registry::RoomRegistry;

/// First-fit matchmaker: reuse the oldest open room with a free slot,
/// otherwise create a fresh one.
pub struct Matchmaker {
    registry: Arc<RoomRegistry>,
    tuning: Arc<Tuning>,
    /// Serializes find-or-create so two simultaneous connections end up
    /// paired in one room instead of opening two
    assign_lock: Mutex<()>,
}

impl Matchmaker {
    pub fn new(registry: Arc<RoomRegistry>, tuning: Arc<Tuning>) -> Self {
        Self {
            registry,
            tuning,
            assign_lock: Mutex::new(()),
        }
    }

    /// Room for the next incoming connection. The returned handle may
    /// still reject the join (capacity race); callers retry with a
    /// fresh assignment.
    pub fn assign_room(&self) -> RoomHandle {
        let _guard = self.assign_lock.lock();
        if let Some(handle) = self.registry.find_open_room() {
            return handle;
        }
        self.create_room()
    }

    fn create_room(&self) -> RoomHandle {
        let id = Uuid::new_v4();
        let (room, handle) = Room::new(id, self.tuning.clone());
        self.registry.insert(handle.clone());

        // The room task owns its own deregistration: once the loop ends
        // the registry entry disappears and the matchmaker can never
        // offer the room again.
        let registry = self.registry.clone();
        tokio::spawn(async move {
            room.run().await;
            registry.remove(&id);
            info!(room_id = %id, "Room removed from registry");
        });

        info!(room_id = %id, "Created room");
        handle
    }
}
