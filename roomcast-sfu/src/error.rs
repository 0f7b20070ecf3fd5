use thiserror::Error;

use crate::types::TrackKey;

pub type Result<T> = std::result::Result<T, SfuError>;

#[derive(Error, Debug)]
pub enum SfuError {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signaling channel closed")]
    SignalClosed,

    #[error("Signaling write failed: {0}")]
    SignalWrite(String),

    #[error("Signaling write timed out")]
    SignalTimeout,

    #[error("Unsupported codec for track {track}: {mime_type:?}")]
    UnsupportedCodec { track: TrackKey, mime_type: String },

    #[error("Remote track has no audio or video kind")]
    UnsupportedKind,

    #[error("Track {0} is not sent on this connection")]
    SenderNotFound(TrackKey),
}
