//! Signaling session of one participant
//!
//! Wires a fresh peer connection to its room: transport callbacks, peer set
//! membership, renegotiation and the inbound signaling loop.

use crate::connection::{ConnectionFactory, MediaConnection, SessionMode};
use crate::error::Result;
use crate::peer::{PeerConnectionState, PeerSet};
use crate::signaling::{read_loop, Signal, SignalSink};
use crate::track::{relay, RtpSource};
use futures::Stream;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Run one participant's session until its signaling channel ends.
///
/// Only connection setup errors are returned; everything after the peer
/// joined is handled and logged here.
pub async fn run_session<S, E>(
    peers: Arc<PeerSet>,
    factory: &ConnectionFactory,
    mode: SessionMode,
    sink: Arc<dyn SignalSink>,
    inbound: S,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: fmt::Display,
{
    let connection = Arc::new(factory.connect(mode).await?);
    let pc = Arc::clone(connection.peer_connection());
    let state = Arc::new(PeerConnectionState::new(
        Arc::clone(&connection) as Arc<dyn MediaConnection>,
        Arc::clone(&sink),
    ));
    let peer_id = state.id.clone();

    let candidate_sink = Arc::clone(&sink);
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = Arc::clone(&candidate_sink);
        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    if let Err(e) = sink.send_signal(&Signal::Candidate(init)).await {
                        debug!(error = %e, "Failed to send ICE candidate");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode ICE candidate"),
            }
        })
    }));

    let weak_pc = Arc::downgrade(&pc);
    let weak_peers = Arc::downgrade(&peers);
    let weak_state = Arc::downgrade(&state);
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        on_state_change(s, weak_pc.clone(), weak_peers.clone(), weak_state.clone());
        Box::pin(async {})
    }));

    if mode == SessionMode::Room {
        let weak_peers = Arc::downgrade(&peers);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                if let Some(peers) = weak_peers.upgrade() {
                    debug!(track_id = %track.id(), kind = ?track.kind(), "Remote track received");
                    tokio::spawn(relay(peers, track as Arc<dyn RtpSource>));
                }
                Box::pin(async {})
            },
        ));
    }

    peers.add_connection(Arc::clone(&state));
    info!(peer_id = %peer_id, ?mode, connections = peers.connection_count(), "Peer joined");
    peers.signal_peers().await;

    read_loop(&state, inbound).await;

    peers.remove_connection(&state);
    if let Err(e) = connection.close().await {
        debug!(peer_id = %peer_id, error = %e, "Failed to close peer connection");
    }
    peers.signal_peers().await;
    info!(peer_id = %peer_id, connections = peers.connection_count(), "Peer left");
    Ok(())
}

/// Transport state callbacks must not call back into the connection
/// synchronously, so the follow-up work is spawned.
fn on_state_change(
    s: RTCPeerConnectionState,
    pc: Weak<webrtc::peer_connection::RTCPeerConnection>,
    peers: Weak<PeerSet>,
    state: Weak<PeerConnectionState>,
) {
    match s {
        RTCPeerConnectionState::Failed => {
            if let Some(pc) = pc.upgrade() {
                tokio::spawn(async move {
                    if let Err(e) = pc.close().await {
                        debug!(error = %e, "Failed to close failed peer connection");
                    }
                });
            }
        }
        RTCPeerConnectionState::Closed => {
            let (Some(peers), Some(state)) = (peers.upgrade(), state.upgrade()) else {
                return;
            };
            if peers.remove_connection(&state) {
                debug!(peer_id = %state.id, "Peer connection closed");
                tokio::spawn(async move {
                    peers.signal_peers().await;
                });
            }
        }
        other => debug!(state = ?other, "Peer connection state changed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[tokio::test]
    async fn test_session_joins_offers_and_leaves() {
        let peers = Arc::new(PeerSet::new(4));
        let factory = ConnectionFactory::new(Vec::new()).unwrap();
        let sink = RecordingSink::new();

        run_session(
            Arc::clone(&peers),
            &factory,
            SessionMode::Stream,
            Arc::clone(&sink) as Arc<dyn SignalSink>,
            futures::stream::empty::<std::result::Result<String, std::io::Error>>(),
        )
        .await
        .unwrap();

        assert_eq!(peers.connection_count(), 0);
        let offers = sink.offers();
        assert_eq!(offers.len(), 1);
        assert!(offers[0].sdp.contains("m=video"));
        assert!(offers[0].sdp.contains("m=audio"));
    }
}
