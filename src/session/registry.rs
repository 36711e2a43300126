//! Room registry - process-wide map from room id to room handle

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::game::RoomHandle;

/// Registry of all live rooms.
///
/// Lookups go through the DashMap; first-fit scans walk the insertion
/// order list so the scan order is deterministic within a process run.
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
    order: Mutex<Vec<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn insert(&self, handle: RoomHandle) {
        self.order.lock().push(handle.id);
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<RoomHandle> {
        self.order.lock().retain(|room_id| room_id != id);
        self.rooms.remove(id).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// First open room with spare capacity, in insertion order
    pub fn find_open_room(&self) -> Option<RoomHandle> {
        let order = self.order.lock();
        for id in order.iter() {
            if let Some(handle) = self.get(id) {
                if handle.has_capacity() {
                    return Some(handle);
                }
            }
        }
        None
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Room, Tuning};
    use std::sync::Arc;

    fn handle() -> RoomHandle {
        let (_room, handle) = Room::new(Uuid::new_v4(), Arc::new(Tuning::default()));
        handle
    }

    #[test]
    fn insert_get_remove() {
        let registry = RoomRegistry::new();
        let h = handle();
        let id = h.id;

        registry.insert(h);
        assert_eq!(registry.active_rooms(), 1);
        assert!(registry.get(&id).is_some());

        registry.remove(&id);
        assert_eq!(registry.active_rooms(), 0);
        assert!(registry.get(&id).is_none());
        assert!(registry.find_open_room().is_none());
    }

    #[test]
    fn find_open_room_is_first_fit_in_insertion_order() {
        let registry = RoomRegistry::new();
        let first = handle();
        let second = handle();
        let first_id = first.id;

        registry.insert(first);
        registry.insert(second);

        let found = registry.find_open_room().unwrap();
        assert_eq!(found.id, first_id);
    }
}
