//! In-memory fakes of the transport seams used by unit tests

use crate::connection::MediaConnection;
use crate::error::{Result, SfuError};
use crate::signaling::{Signal, SignalMessage, SignalSink};
use crate::track::{PublishedTrack, RtpSource};
use crate::types::{TrackKey, TrackKind};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

/// Remote track fed from a channel; dropping the sender ends the stream.
pub struct ChannelSource {
    key: TrackKey,
    rx: tokio::sync::Mutex<mpsc::Receiver<Packet>>,
}

impl ChannelSource {
    pub fn new(key: TrackKey) -> (Arc<Self>, mpsc::Sender<Packet>) {
        let (tx, rx) = mpsc::channel(16);
        let source = Self {
            key,
            rx: tokio::sync::Mutex::new(rx),
        };
        (Arc::new(source), tx)
    }
}

#[async_trait]
impl RtpSource for ChannelSource {
    fn key(&self) -> Option<TrackKey> {
        Some(self.key.clone())
    }

    fn stream_id(&self) -> String {
        "publisher".to_string()
    }

    fn codec(&self) -> RTCRtpCodecCapability {
        codec_for(self.key.kind)
    }

    async fn read_packet(&self) -> Result<Packet> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| SfuError::WebRtc(webrtc::Error::new("source closed".to_string())))
    }
}

pub fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    let (mime_type, clock_rate) = match kind {
        TrackKind::Video => ("video/VP8", 90000),
        TrackKind::Audio => ("audio/opus", 48000),
    };
    RTCRtpCodecCapability {
        mime_type: mime_type.to_string(),
        clock_rate,
        ..Default::default()
    }
}

pub fn published(key: TrackKey) -> Arc<PublishedTrack> {
    let codec = codec_for(key.kind);
    Arc::new(PublishedTrack::new(key, "publisher", codec).unwrap())
}

pub fn packet(sequence_number: u16) -> Packet {
    Packet {
        header: Header {
            version: 2,
            sequence_number,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
    }
}

#[derive(Default)]
struct FakeState {
    inbound: Vec<TrackKey>,
    sent: HashSet<TrackKey>,
    candidates: Vec<String>,
    answers: usize,
}

/// Peer connection that records what the engine asks of it
#[derive(Default)]
pub struct FakeConnection {
    state: Mutex<FakeState>,
    closed: AtomicBool,
    fail_offers: AtomicBool,
    fail_key_frames: AtomicBool,
    key_frame_requests: AtomicUsize,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend the browser publishes `key` on this connection.
    pub fn publish(&self, key: TrackKey) {
        self.state.lock().inbound.push(key);
    }

    pub fn sent(&self) -> HashSet<TrackKey> {
        self.state.lock().sent.clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.state.lock().candidates.clone()
    }

    pub fn answers(&self) -> usize {
        self.state.lock().answers
    }

    pub fn key_frame_requests(&self) -> usize {
        self.key_frame_requests.load(Ordering::SeqCst)
    }

    pub fn set_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_offers(&self, fail: bool) {
        self.fail_offers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_key_frames(&self, fail: bool) {
        self.fail_key_frames.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn inbound_tracks(&self) -> Vec<TrackKey> {
        self.state.lock().inbound.clone()
    }

    async fn outbound_tracks(&self) -> Vec<TrackKey> {
        self.state.lock().sent.iter().cloned().collect()
    }

    async fn add_sender(&self, track: &PublishedTrack) -> Result<()> {
        self.state.lock().sent.insert(track.key().clone());
        Ok(())
    }

    async fn remove_sender(&self, key: &TrackKey) -> Result<()> {
        if self.state.lock().sent.remove(key) {
            Ok(())
        } else {
            Err(SfuError::SenderNotFound(key.clone()))
        }
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription> {
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(SfuError::WebRtc(webrtc::Error::new("offer failed".to_string())));
        }
        let mut tracks: Vec<String> = self.state.lock().sent.iter().map(ToString::to_string).collect();
        tracks.sort();
        let mut offer = RTCSessionDescription::default();
        offer.sdp_type = RTCSdpType::Offer;
        offer.sdp = tracks.iter().map(|t| format!("a=track:{t}\r\n")).collect();
        Ok(offer)
    }

    async fn apply_answer(&self, _answer: RTCSessionDescription) -> Result<()> {
        self.state.lock().answers += 1;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.state.lock().candidates.push(candidate.candidate);
        Ok(())
    }

    async fn request_key_frames(&self) -> Vec<SfuError> {
        self.key_frame_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_key_frames.load(Ordering::SeqCst) {
            vec![SfuError::WebRtc(webrtc::Error::new("pli failed".to_string()))]
        } else {
            Vec::new()
        }
    }

    async fn close(&self) -> Result<()> {
        self.set_closed();
        Ok(())
    }
}

/// Signaling writer that keeps every message it was asked to send
#[derive(Default)]
pub struct RecordingSink {
    texts: Mutex<Vec<String>>,
    fail: AtomicBool,
    fail_next: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn offers(&self) -> Vec<RTCSessionDescription> {
        self.texts()
            .iter()
            .filter_map(|text| SignalMessage::parse(text).ok()?.decode().ok()?)
            .filter_map(|signal| match signal {
                Signal::Offer(offer) => Some(offer),
                _ => None,
            })
            .collect()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SfuError::SignalClosed);
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SfuError::SignalClosed);
        }
        self.texts.lock().push(text);
        Ok(())
    }
}

/// Signaling writer whose socket never drains
pub struct StalledSink;

#[async_trait]
impl SignalSink for StalledSink {
    async fn send_text(&self, _text: String) -> Result<()> {
        std::future::pending().await
    }
}
