//! Peer connection state and the per-room peer set
//!
//! This module handles:
//! - Joined peer connections and their signaling writers
//! - The room's published track map
//! - Bringing every peer's senders in line with the track map
//! - Best-effort key-frame requests

use crate::connection::MediaConnection;
use crate::error::{Result, SfuError};
use crate::renegotiation::{PassOutcome, Renegotiator, Trigger};
use crate::signaling::{Signal, SignalSink};
use crate::track::{PublishedTrack, RtpSource};
use crate::types::{PeerId, TrackKey};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Time allowed to hand one offer to a peer's signaling channel
const OFFER_WRITE_WAIT: Duration = Duration::from_secs(10);

/// One joined participant
pub struct PeerConnectionState {
    pub id: PeerId,
    connection: Arc<dyn MediaConnection>,
    signal: Arc<dyn SignalSink>,
    /// Track set of the last offer delivered; `None` before the first one.
    synced: Mutex<Option<HashSet<TrackKey>>>,
}

impl PeerConnectionState {
    pub fn new(connection: Arc<dyn MediaConnection>, signal: Arc<dyn SignalSink>) -> Self {
        Self {
            id: PeerId::generate(),
            connection,
            signal,
            synced: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn MediaConnection> {
        &self.connection
    }

    #[must_use]
    pub fn signal(&self) -> &Arc<dyn SignalSink> {
        &self.signal
    }

    #[must_use]
    pub fn synced_tracks(&self) -> Option<HashSet<TrackKey>> {
        self.synced.lock().clone()
    }

    /// Align this peer's senders with `tracks` and offer the result.
    ///
    /// The offer is skipped only when the last delivered offer already
    /// covered `tracks`. Returns whether an offer was sent.
    pub async fn synchronize(&self, tracks: &HashMap<TrackKey, Arc<PublishedTrack>>) -> Result<bool> {
        let inbound: HashSet<TrackKey> = self.connection.inbound_tracks().await.into_iter().collect();
        let outbound: HashSet<TrackKey> = self.connection.outbound_tracks().await.into_iter().collect();
        let mut changed = false;

        for key in &outbound {
            if !tracks.contains_key(key) {
                self.connection.remove_sender(key).await?;
                changed = true;
            }
        }

        for (key, track) in tracks {
            // No loopback: a publisher never receives its own track.
            if outbound.contains(key) || inbound.contains(key) {
                continue;
            }
            self.connection.add_sender(track).await?;
            changed = true;
        }

        let snapshot: HashSet<TrackKey> = tracks.keys().cloned().collect();
        if !changed && self.synced.lock().as_ref() == Some(&snapshot) {
            return Ok(false);
        }

        let offer = self.connection.create_offer().await?;
        timeout(OFFER_WRITE_WAIT, self.signal.send_signal(&Signal::Offer(offer)))
            .await
            .map_err(|_| SfuError::SignalTimeout)??;
        *self.synced.lock() = Some(snapshot);
        debug!(peer_id = %self.id, tracks = tracks.len(), "Offer sent");
        Ok(true)
    }
}

#[derive(Default)]
struct PeerSetInner {
    connections: Vec<Arc<PeerConnectionState>>,
    tracks: HashMap<TrackKey, Arc<PublishedTrack>>,
}

/// Connected peers and published tracks of one room
pub struct PeerSet {
    inner: Mutex<PeerSetInner>,
    renegotiator: Renegotiator,
}

impl PeerSet {
    #[must_use]
    pub fn new(max_renegotiation_passes: usize) -> Self {
        Self {
            inner: Mutex::new(PeerSetInner::default()),
            renegotiator: Renegotiator::new(max_renegotiation_passes),
        }
    }

    pub fn add_connection(&self, state: Arc<PeerConnectionState>) {
        let mut inner = self.inner.lock();
        inner.connections.push(state);
        debug!(connections = inner.connections.len(), "Connection added");
    }

    /// Remove by identity. Returns whether the state was present.
    pub fn remove_connection(&self, state: &Arc<PeerConnectionState>) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.connections.len();
        inner.connections.retain(|c| !Arc::ptr_eq(c, state));
        before != inner.connections.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    #[must_use]
    pub fn connections(&self) -> Vec<Arc<PeerConnectionState>> {
        self.inner.lock().connections.clone()
    }

    #[must_use]
    pub fn track_keys(&self) -> HashSet<TrackKey> {
        self.inner.lock().tracks.keys().cloned().collect()
    }

    #[must_use]
    pub const fn renegotiator(&self) -> &Renegotiator {
        &self.renegotiator
    }

    /// Publish a remote track. `None` for a duplicate key or an unusable codec.
    pub async fn add_track(&self, source: &dyn RtpSource) -> Option<Arc<PublishedTrack>> {
        let track = match PublishedTrack::from_source(source) {
            Ok(track) => Arc::new(track),
            Err(e) => {
                warn!(error = %e, "Rejected published track");
                return None;
            }
        };

        {
            let mut inner = self.inner.lock();
            if inner.tracks.contains_key(track.key()) {
                debug!(track = %track.key(), "Track already published");
                return None;
            }
            inner.tracks.insert(track.key().clone(), Arc::clone(&track));
        }
        info!(track = %track.key(), "Track published");

        self.signal_peers().await;
        Some(track)
    }

    /// Unpublish a track. Returns whether it was present.
    pub async fn remove_track(&self, key: &TrackKey) -> bool {
        let removed = self.inner.lock().tracks.remove(key).is_some();
        if removed {
            info!(track = %key, "Track unpublished");
            self.signal_peers().await;
        }
        removed
    }

    /// Trigger a renegotiation round for every peer in the room.
    pub async fn signal_peers(&self) -> Trigger {
        self.renegotiator.run(|| self.sync_pass()).await
    }

    async fn sync_pass(&self) -> PassOutcome {
        let (connections, tracks) = {
            let mut inner = self.inner.lock();
            inner.connections.retain(|c| !c.connection.is_closed());
            (inner.connections.clone(), inner.tracks.clone())
        };

        let results = join_all(connections.iter().map(|peer| peer.synchronize(&tracks))).await;

        let mut outcome = PassOutcome::Settled;
        for (peer, result) in connections.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(SfuError::SignalTimeout) => {
                    // A peer that stops reading its socket is dropped.
                    warn!(peer_id = %peer.id, "Signaling write timed out, dropping peer");
                    self.remove_connection(peer);
                    if let Err(e) = peer.connection.close().await {
                        debug!(peer_id = %peer.id, error = %e, "Failed to close stalled connection");
                    }
                }
                Err(e) => {
                    warn!(peer_id = %peer.id, error = %e, "Failed to synchronize peer");
                    outcome = PassOutcome::Retry;
                }
            }
        }
        outcome
    }

    /// Request a key frame from every publisher in the room.
    pub async fn dispatch_key_frame(&self) {
        for peer in self.connections() {
            for e in peer.connection.request_key_frames().await {
                debug!(peer_id = %peer.id, error = %e, "Key frame request failed");
            }
        }
    }
}
