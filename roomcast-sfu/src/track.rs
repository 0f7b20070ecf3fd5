//! Published tracks and the relay loop that feeds them
//!
//! A publisher's inbound remote track is read by exactly one relay task,
//! which writes every RTP packet unmodified into a shared local track.
//! Every viewer's peer connection sends that same local track.

use crate::error::{Result, SfuError};
use crate::peer::PeerSet;
use crate::types::{TrackKey, TrackKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::marshal::MarshalSize;

/// Inbound media source of a publisher
#[async_trait]
pub trait RtpSource: Send + Sync {
    /// `None` when the source has no audio/video kind.
    fn key(&self) -> Option<TrackKey>;

    fn stream_id(&self) -> String;

    fn codec(&self) -> RTCRtpCodecCapability;

    async fn read_packet(&self) -> Result<Packet>;
}

#[async_trait]
impl RtpSource for TrackRemote {
    fn key(&self) -> Option<TrackKey> {
        TrackKind::from_codec_type(self.kind()).map(|kind| TrackKey::new(kind, self.id()))
    }

    fn stream_id(&self) -> String {
        TrackRemote::stream_id(self)
    }

    fn codec(&self) -> RTCRtpCodecCapability {
        TrackRemote::codec(self).capability
    }

    async fn read_packet(&self) -> Result<Packet> {
        let (packet, _attributes) = self.read_rtp().await?;
        Ok(packet)
    }
}

/// A track relayed to every other participant of a room
pub struct PublishedTrack {
    key: TrackKey,
    codec: RTCRtpCodecCapability,
    local: Arc<TrackLocalStaticRTP>,
    packets_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
}

impl PublishedTrack {
    /// Create the local sink mirroring a publisher's remote track.
    pub fn new(key: TrackKey, stream_id: impl Into<String>, codec: RTCRtpCodecCapability) -> Result<Self> {
        if codec.mime_type.is_empty() {
            return Err(SfuError::UnsupportedCodec {
                track: key,
                mime_type: codec.mime_type,
            });
        }
        let local = Arc::new(TrackLocalStaticRTP::new(
            codec.clone(),
            key.id.clone(),
            stream_id.into(),
        ));
        Ok(Self {
            key,
            codec,
            local,
            packets_relayed: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
        })
    }

    pub fn from_source(source: &dyn RtpSource) -> Result<Self> {
        let codec = source.codec();
        let key = source.key().ok_or(SfuError::UnsupportedKind)?;
        Self::new(key, source.stream_id(), codec)
    }

    #[must_use]
    pub const fn key(&self) -> &TrackKey {
        &self.key
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.codec.mime_type
    }

    #[must_use]
    pub fn local(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::clone(&self.local)
    }

    pub async fn write(&self, packet: &Packet) -> Result<()> {
        self.local.write_rtp(packet).await?;
        self.packets_relayed.fetch_add(1, Ordering::Relaxed);
        let size = packet.header.marshal_size() + packet.payload.len();
        self.bytes_relayed.fetch_add(size as u64, Ordering::Relaxed);
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> TrackStats {
        TrackStats {
            packets_relayed: self.packets_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStats {
    pub packets_relayed: u64,
    pub bytes_relayed: u64,
}

/// Relay one inbound track into the room until the source or the sink fails.
///
/// The track is unpublished exactly once, after the loop ends.
pub async fn relay(peers: Arc<PeerSet>, source: Arc<dyn RtpSource>) {
    let Some(track) = peers.add_track(source.as_ref()).await else {
        return;
    };
    let key = track.key().clone();
    info!(track = %key, codec = %track.mime_type(), "Relay started");

    let reason = loop {
        let packet = match source.read_packet().await {
            Ok(packet) => packet,
            Err(e) => break e,
        };
        if let Err(e) = track.write(&packet).await {
            warn!(track = %key, error = %e, "Failed to write RTP packet to local track");
            break e;
        }
    };

    debug!(track = %key, reason = %reason, "Relay source ended");
    peers.remove_track(&key).await;

    let stats = track.stats();
    info!(
        track = %key,
        packets = stats.packets_relayed,
        bytes = stats.bytes_relayed,
        "Relay stopped"
    );
}
