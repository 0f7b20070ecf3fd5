//! Periodic key-frame requests
//!
//! New viewers cannot decode until the publisher sends a key frame, so every
//! publisher is asked for one on a fixed tick.

use crate::registry::RoomRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace};

/// Ask every publisher of every live room for a key frame.
///
/// Rooms are dispatched concurrently.
pub async fn dispatch_all(registry: &RoomRegistry) {
    let rooms = registry.rooms();
    trace!(rooms = rooms.len(), "Dispatching key frame requests");
    join_all(rooms.iter().map(|room| room.peers.dispatch_key_frame())).await;
}

/// Spawn the process-wide key-frame timer.
pub fn spawn_dispatcher(registry: Arc<RoomRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Starting key frame dispatcher (interval: {:?})", period);

        loop {
            ticker.tick().await;
            dispatch_all(&registry).await;
        }
    })
}
