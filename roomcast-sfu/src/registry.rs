//! Room registry
//!
//! Maps room ids and their stream aliases to live rooms. Rooms are created
//! on first access and live for the rest of the process.

use crate::config::SfuConfig;
use crate::room::Room;
use crate::types::{RoomId, StreamId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
struct Maps {
    rooms: HashMap<RoomId, Arc<Room>>,
    streams: HashMap<StreamId, Arc<Room>>,
}

pub struct RoomRegistry {
    config: Arc<SfuConfig>,
    maps: Mutex<Maps>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(config: Arc<SfuConfig>) -> Self {
        Self {
            config,
            maps: Mutex::new(Maps::default()),
        }
    }

    /// Look up or create the room for `room_id`.
    ///
    /// The whole check-and-create runs under one lock. The stream alias is
    /// always (re)bound to the returned room.
    pub fn get_or_create_room(&self, room_id: &RoomId) -> (RoomId, StreamId, Arc<Room>) {
        let mut maps = self.maps.lock();

        let existing = maps.rooms.get(room_id).cloned();
        let room = match existing {
            Some(room) => room,
            None => {
                let room = Arc::new(Room::new(room_id.clone(), &self.config));
                maps.rooms.insert(room_id.clone(), Arc::clone(&room));
                info!(
                    room_id = %room_id,
                    stream_id = %room.stream_id,
                    total_rooms = maps.rooms.len(),
                    "Created new room"
                );
                room
            }
        };
        maps.streams.insert(room.stream_id.clone(), Arc::clone(&room));

        (room.id.clone(), room.stream_id.clone(), room)
    }

    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.maps.lock().rooms.get(room_id).cloned()
    }

    #[must_use]
    pub fn stream(&self, stream_id: &StreamId) -> Option<Arc<Room>> {
        self.maps.lock().streams.get(stream_id).cloned()
    }

    /// Resolve either a room id or a stream alias.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<Room>> {
        let maps = self.maps.lock();
        maps.rooms
            .get(&RoomId::from(id))
            .or_else(|| maps.streams.get(&StreamId::from(id)))
            .cloned()
    }

    /// Snapshot of every live room.
    #[must_use]
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.maps.lock().rooms.values().cloned().collect()
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.maps.lock().rooms.len()
    }
}
