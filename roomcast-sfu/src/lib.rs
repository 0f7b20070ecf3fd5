//! Roomcast SFU (Selective Forwarding Unit)
//!
//! Browsers join a named room over a WebSocket signaling channel. Every
//! track a participant publishes is relayed, packet for packet, to every
//! other participant of the room and to the room's stream viewers.
//!
//! ## Architecture
//!
//! - **`RoomRegistry`**: room ids and their stream aliases
//! - **`PeerSet`**: connections and published tracks of one room
//! - **`Renegotiator`**: coalesces overlapping renegotiation triggers
//! - **`relay`**: one task per inbound track feeding a shared local track
//! - **`ChatHub`**: per-room text chat actor
//! - **`SfuManager`**: the facade used by the HTTP layer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roomcast_sfu::{RoomId, SfuConfig, SfuManager};
//!
//! let manager = SfuManager::new(SfuConfig::default())?;
//! manager.start();
//!
//! let (room_id, stream_id) = manager.join_room(&RoomId::from("lobby"));
//! manager.room_signaling(&room_id, sink, inbound).await?;
//! ```

mod chat;
mod config;
mod connection;
mod error;
mod keyframe;
mod manager;
mod peer;
mod registry;
mod renegotiation;
mod room;
mod session;
mod signaling;
mod track;
mod types;

#[cfg(test)]
mod testing;

pub use chat::{ChatHub, ChatMember};
pub use config::SfuConfig;
pub use connection::{ConnectionFactory, MediaConnection, SessionMode, WebRtcConnection};
pub use error::{Result, SfuError};
pub use keyframe::{dispatch_all, spawn_dispatcher};
pub use manager::SfuManager;
pub use peer::{PeerConnectionState, PeerSet};
pub use registry::RoomRegistry;
pub use renegotiation::{PassOutcome, Renegotiator, Trigger};
pub use room::{Room, RoomStats};
pub use session::run_session;
pub use signaling::{read_loop, watch_viewers, Signal, SignalEvent, SignalMessage, SignalSink, SinkWriter};
pub use track::{relay, PublishedTrack, RtpSource, TrackStats};
pub use types::{PeerId, RoomId, StreamId, TrackKey, TrackKind};
