//! Transport capability layer
//!
//! The engine only talks to peer connections through [`MediaConnection`].
//! [`WebRtcConnection`] implements it on top of `webrtc`; tests substitute
//! in-memory fakes so renegotiation can be exercised without a network.

use crate::error::{Result, SfuError};
use crate::track::PublishedTrack;
use crate::types::{TrackKey, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;

/// What the SFU needs from one participant's peer connection
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// True once the connection reached its terminal state.
    fn is_closed(&self) -> bool;

    /// Tracks this peer publishes to us.
    async fn inbound_tracks(&self) -> Vec<TrackKey>;

    /// Tracks currently bound to an outbound sender.
    async fn outbound_tracks(&self) -> Vec<TrackKey>;

    async fn add_sender(&self, track: &PublishedTrack) -> Result<()>;

    async fn remove_sender(&self, key: &TrackKey) -> Result<()>;

    /// Create an offer and install it as the local description.
    async fn create_offer(&self) -> Result<RTCSessionDescription>;

    async fn apply_answer(&self, answer: RTCSessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()>;

    /// Ask every publisher on this connection for a key frame.
    ///
    /// Returns the failures; one failing receiver does not stop the rest.
    async fn request_key_frames(&self) -> Vec<SfuError>;

    async fn close(&self) -> Result<()>;
}

/// Which way media flows between the server and the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Participants publish to the server and receive everyone else.
    Room,
    /// Viewers only receive the room's tracks.
    Stream,
}

impl SessionMode {
    #[must_use]
    pub const fn transceiver_direction(&self) -> RTCRtpTransceiverDirection {
        match self {
            Self::Room => RTCRtpTransceiverDirection::Recvonly,
            Self::Stream => RTCRtpTransceiverDirection::Sendonly,
        }
    }
}

fn key_of(kind: RTPCodecType, id: impl Into<String>) -> Option<TrackKey> {
    TrackKind::from_codec_type(kind).map(|kind| TrackKey::new(kind, id))
}

/// [`MediaConnection`] backed by a `webrtc` peer connection
pub struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcConnection {
    #[must_use]
    pub const fn new(pc: Arc<RTCPeerConnection>) -> Self {
        Self { pc }
    }

    #[must_use]
    pub const fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    async fn sender_for(&self, key: &TrackKey) -> Option<Arc<RTCRtpSender>> {
        for sender in self.pc.get_senders().await {
            if let Some(track) = sender.track().await {
                if key_of(track.kind(), track.id()).as_ref() == Some(key) {
                    return Some(sender);
                }
            }
        }
        None
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    fn is_closed(&self) -> bool {
        self.pc.connection_state() == RTCPeerConnectionState::Closed
    }

    async fn inbound_tracks(&self) -> Vec<TrackKey> {
        let mut keys = Vec::new();
        for receiver in self.pc.get_receivers().await {
            for track in receiver.tracks().await {
                keys.extend(key_of(track.kind(), track.id()));
            }
        }
        keys
    }

    async fn outbound_tracks(&self) -> Vec<TrackKey> {
        let mut keys = Vec::new();
        for sender in self.pc.get_senders().await {
            if let Some(track) = sender.track().await {
                keys.extend(key_of(track.kind(), track.id()));
            }
        }
        keys
    }

    async fn add_sender(&self, track: &PublishedTrack) -> Result<()> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.local();
        let sender = self.pc.add_track(local).await?;

        // Interceptors (NACK, reports) only run while RTCP is being read.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn remove_sender(&self, key: &TrackKey) -> Result<()> {
        let sender = self
            .sender_for(key)
            .await
            .ok_or_else(|| SfuError::SenderNotFound(key.clone()))?;
        self.pc.remove_track(&sender).await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn apply_answer(&self, answer: RTCSessionDescription) -> Result<()> {
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.pc.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn request_key_frames(&self) -> Vec<SfuError> {
        let mut failures = Vec::new();
        for receiver in self.pc.get_receivers().await {
            for track in receiver.tracks().await {
                let pli = PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc: track.ssrc(),
                };
                if let Err(e) = self.pc.write_rtcp(&[Box::new(pli)]).await {
                    failures.push(e.into());
                }
            }
        }
        failures
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Builds server-side peer connections from one shared `webrtc` API
pub struct ConnectionFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl ConnectionFactory {
    pub fn new(ice_servers: Vec<String>) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        info!(ice_servers = ice_servers.len(), "WebRTC connection factory ready");
        Ok(Self { api, ice_servers })
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    /// Create a connection with one video and one audio transceiver.
    pub async fn connect(&self, mode: SessionMode) -> Result<WebRtcConnection> {
        let pc = Arc::new(self.api.new_peer_connection(self.configuration()).await?);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            let init = RTCRtpTransceiverInit {
                direction: mode.transceiver_direction(),
                send_encodings: Vec::new(),
            };
            if let Err(e) = pc.add_transceiver_from_kind(kind, Some(init)).await {
                let _ = pc.close().await;
                return Err(e.into());
            }
        }

        debug!(?mode, "Peer connection created");
        Ok(WebRtcConnection::new(pc))
    }
}
