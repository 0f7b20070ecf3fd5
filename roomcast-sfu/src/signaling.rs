//! Signaling wire protocol
//!
//! Every message is a JSON envelope `{"event": .., "data": ..}` where `data`
//! is itself a JSON document encoded as a string: an ICE candidate init for
//! `candidate`, a session description for `offer` and `answer`.

use crate::error::{Result, SfuError};
use crate::peer::{PeerConnectionState, PeerSet};
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalEvent {
    Candidate,
    Offer,
    Answer,
    #[serde(other)]
    Unknown,
}

/// Raw envelope as it travels over the socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub event: SignalEvent,
    #[serde(default)]
    pub data: String,
}

impl SignalMessage {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload. `None` for events the server does not handle.
    pub fn decode(&self) -> Result<Option<Signal>> {
        let signal = match self.event {
            SignalEvent::Candidate => Signal::Candidate(serde_json::from_str(&self.data)?),
            SignalEvent::Offer => Signal::Offer(serde_json::from_str(&self.data)?),
            SignalEvent::Answer => Signal::Answer(serde_json::from_str(&self.data)?),
            SignalEvent::Unknown => return Ok(None),
        };
        Ok(Some(signal))
    }
}

/// A decoded signaling message
#[derive(Debug, Clone)]
pub enum Signal {
    Candidate(RTCIceCandidateInit),
    Offer(RTCSessionDescription),
    Answer(RTCSessionDescription),
}

impl Signal {
    pub fn to_message(&self) -> Result<SignalMessage> {
        let (event, data) = match self {
            Self::Candidate(candidate) => (SignalEvent::Candidate, serde_json::to_string(candidate)?),
            Self::Offer(sdp) => (SignalEvent::Offer, serde_json::to_string(sdp)?),
            Self::Answer(sdp) => (SignalEvent::Answer, serde_json::to_string(sdp)?),
        };
        Ok(SignalMessage { event, data })
    }
}

/// Outbound half of a signaling channel
///
/// Implementations serialise writes: the underlying socket must never see
/// two concurrent writers.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;

    async fn send_signal(&self, signal: &Signal) -> Result<()> {
        let text = signal.to_message()?.to_json()?;
        self.send_text(text).await
    }
}

/// [`SignalSink`] over any text sink, guarded by an async mutex
pub struct SinkWriter<S> {
    inner: Mutex<S>,
}

impl<S> SinkWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl<S> SignalSink for SinkWriter<S>
where
    S: Sink<String> + Send + Unpin,
    S::Error: fmt::Display,
{
    async fn send_text(&self, text: String) -> Result<()> {
        let mut sink = self.inner.lock().await;
        sink.send(text)
            .await
            .map_err(|e| SfuError::SignalWrite(e.to_string()))
    }
}

/// Process inbound signaling for one peer until the channel ends.
///
/// Messages are handled in arrival order. Malformed messages and failed
/// candidate or answer application are logged and skipped.
pub async fn read_loop<S, E>(peer: &PeerConnectionState, mut inbound: S)
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(item) = inbound.next().await {
        let text = match item {
            Ok(text) => text,
            Err(e) => {
                debug!(peer_id = %peer.id, error = %e, "Signaling read failed");
                return;
            }
        };

        let signal = match SignalMessage::parse(&text).and_then(|message| message.decode()) {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                debug!(peer_id = %peer.id, "Ignoring unknown signaling event");
                continue;
            }
            Err(e) => {
                warn!(peer_id = %peer.id, error = %e, "Malformed signaling message");
                continue;
            }
        };

        match signal {
            Signal::Candidate(candidate) => {
                if let Err(e) = peer.connection().add_ice_candidate(candidate).await {
                    warn!(peer_id = %peer.id, error = %e, "Failed to add ICE candidate");
                }
            }
            Signal::Answer(answer) => {
                if let Err(e) = peer.connection().apply_answer(answer).await {
                    warn!(peer_id = %peer.id, error = %e, "Failed to apply answer");
                }
            }
            Signal::Offer(_) => {
                debug!(peer_id = %peer.id, "Ignoring client offer");
            }
        }
    }
    debug!(peer_id = %peer.id, "Signaling channel closed");
}

/// Send the room's connection count as plain text every `period` until a
/// write fails.
pub async fn watch_viewers(peers: Arc<PeerSet>, sink: Arc<dyn SignalSink>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let count = peers.connection_count();
        if let Err(e) = sink.send_text(count.to_string()).await {
            debug!(error = %e, "Viewer count channel closed");
            return;
        }
    }
}
