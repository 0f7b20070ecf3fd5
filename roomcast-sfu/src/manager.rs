//! SFU Manager - entry point used by the HTTP layer
//!
//! This module provides:
//! - Room creation and stream alias resolution
//! - Room and stream signaling sessions
//! - The viewer-count side channel
//! - Chat hub lookup
//! - The background key-frame dispatcher

use crate::chat::ChatHub;
use crate::config::SfuConfig;
use crate::connection::{ConnectionFactory, SessionMode};
use crate::error::Result;
use crate::keyframe;
use crate::registry::RoomRegistry;
use crate::room::{Room, RoomStats};
use crate::session::run_session;
use crate::signaling::{watch_viewers, SignalSink};
use crate::types::{RoomId, StreamId};
use futures::Stream;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct SfuManager {
    config: Arc<SfuConfig>,
    registry: Arc<RoomRegistry>,
    factory: ConnectionFactory,
}

impl SfuManager {
    pub fn new(config: SfuConfig) -> Result<Arc<Self>> {
        let config = Arc::new(config);
        let factory = ConnectionFactory::new(config.ice_servers.clone())?;
        let manager = Arc::new(Self {
            registry: Arc::new(RoomRegistry::new(Arc::clone(&config))),
            config,
            factory,
        });

        info!(
            ice_servers = manager.config.ice_servers.len(),
            key_frame_interval_secs = manager.config.key_frame_interval_secs,
            max_renegotiation_passes = manager.config.max_renegotiation_passes,
            "SFU Manager initialized"
        );
        Ok(manager)
    }

    /// Start background tasks.
    pub fn start(&self) -> JoinHandle<()> {
        keyframe::spawn_dispatcher(Arc::clone(&self.registry), self.config.key_frame_interval())
    }

    #[must_use]
    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Create or reuse a room and return its ids.
    pub fn join_room(&self, room_id: &RoomId) -> (RoomId, StreamId) {
        let (room_id, stream_id, _room) = self.registry.get_or_create_room(room_id);
        (room_id, stream_id)
    }

    #[must_use]
    pub fn stream(&self, stream_id: &StreamId) -> Option<Arc<Room>> {
        self.registry.stream(stream_id)
    }

    #[must_use]
    pub fn room_stats(&self, room_id: &RoomId) -> Option<RoomStats> {
        self.registry.room(room_id).map(|room| room.stats())
    }

    /// Publish/subscribe session in a room, created on demand.
    pub async fn room_signaling<S, E>(&self, room_id: &RoomId, sink: Arc<dyn SignalSink>, inbound: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        let (_, _, room) = self.registry.get_or_create_room(room_id);
        run_session(Arc::clone(&room.peers), &self.factory, SessionMode::Room, sink, inbound).await
    }

    /// Receive-only session on a stream alias.
    ///
    /// Returns `Ok(false)` without opening a connection when the alias is unknown.
    pub async fn stream_signaling<S, E>(
        &self,
        stream_id: &StreamId,
        sink: Arc<dyn SignalSink>,
        inbound: S,
    ) -> Result<bool>
    where
        S: Stream<Item = std::result::Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        let Some(room) = self.registry.stream(stream_id) else {
            debug!(stream_id = %stream_id, "Stream not found");
            return Ok(false);
        };
        run_session(Arc::clone(&room.peers), &self.factory, SessionMode::Stream, sink, inbound).await?;
        Ok(true)
    }

    /// Push the connection count of a room or stream until the sink fails.
    ///
    /// Returns `false` when `id` names no live room.
    pub async fn viewer_count(&self, id: &str, sink: Arc<dyn SignalSink>) -> bool {
        let Some(room) = self.registry.lookup(id) else {
            return false;
        };
        watch_viewers(Arc::clone(&room.peers), sink, self.config.viewer_count_interval()).await;
        true
    }

    /// Chat hub of a room, created on demand.
    pub fn room_chat(&self, room_id: &RoomId) -> ChatHub {
        let (_, _, room) = self.registry.get_or_create_room(room_id);
        room.chat.clone()
    }

    #[must_use]
    pub fn stream_chat(&self, stream_id: &StreamId) -> Option<ChatHub> {
        self.registry.stream(stream_id).map(|room| room.chat.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    fn manager() -> Arc<SfuManager> {
        SfuManager::new(SfuConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_join_room_is_idempotent() {
        let manager = manager();
        let first = manager.join_room(&RoomId::from("r1"));
        let second = manager.join_room(&RoomId::from("r1"));
        assert_eq!(first, second);
        assert_eq!(first.1, StreamId::derive(&RoomId::from("r1")));
        assert_eq!(manager.registry().room_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_resolves_to_joined_room() {
        let manager = manager();
        let (room_id, stream_id) = manager.join_room(&RoomId::from("r1"));
        let room = manager.stream(&stream_id).unwrap();
        assert_eq!(room.id, room_id);

        let stats = manager.room_stats(&room_id).unwrap();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.stream_id, stream_id);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_a_noop() {
        let manager = manager();
        let found = manager
            .stream_signaling(
                &StreamId::from("missing"),
                RecordingSink::new() as Arc<dyn SignalSink>,
                futures::stream::empty::<std::result::Result<String, std::io::Error>>(),
            )
            .await
            .unwrap();
        assert!(!found);
        assert!(!manager.viewer_count("missing", RecordingSink::new()).await);
        assert!(manager.stream_chat(&StreamId::from("missing")).is_none());
    }

    #[tokio::test]
    async fn test_room_and_stream_share_chat() {
        let manager = manager();
        let (room_id, stream_id) = manager.join_room(&RoomId::from("r1"));
        let room_hub = manager.room_chat(&room_id);
        let stream_hub = manager.stream_chat(&stream_id).unwrap();

        let mut member = stream_hub.join().unwrap();
        room_hub.broadcast("hello");
        assert_eq!(member.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewer_count_by_stream_id() {
        let manager = manager();
        let (_, stream_id) = manager.join_room(&RoomId::from("r1"));
        let sink = RecordingSink::new();

        let task = {
            let manager = Arc::clone(&manager);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { manager.viewer_count(stream_id.as_str(), sink).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        sink.fail_writes(true);
        assert!(task.await.unwrap());
        assert_eq!(sink.texts(), vec!["0".to_string()]);
    }
}
