//! SFU room

use crate::chat::ChatHub;
use crate::config::SfuConfig;
use crate::peer::PeerSet;
use crate::types::{RoomId, StreamId};
use serde::Serialize;
use std::sync::Arc;

pub struct Room {
    pub id: RoomId,
    pub stream_id: StreamId,
    pub peers: Arc<PeerSet>,
    pub chat: ChatHub,
}

impl Room {
    /// Create a room with an empty peer set and a running chat hub.
    #[must_use]
    pub fn new(id: RoomId, config: &SfuConfig) -> Self {
        let stream_id = StreamId::derive(&id);
        Self {
            id,
            stream_id,
            peers: Arc::new(PeerSet::new(config.max_renegotiation_passes)),
            chat: ChatHub::spawn(config.chat_client_buffer),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RoomStats {
        RoomStats {
            room_id: self.id.clone(),
            stream_id: self.stream_id.clone(),
            connections: self.peers.connection_count(),
            tracks: self.peers.track_keys().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub room_id: RoomId,
    pub stream_id: StreamId,
    pub connections: usize,
    pub tracks: usize,
}
