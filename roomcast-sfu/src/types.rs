//! Common types used throughout the SFU implementation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a room as chosen by the participants
    RoomId
);

string_id!(
    /// Broadcast alias of a room, derived from the [`RoomId`]
    StreamId
);

string_id!(
    /// Server-assigned identifier of one joined peer connection
    PeerId
);

impl StreamId {
    /// Derive the stream alias of a room: lowercase hex SHA-256 of the room id.
    #[must_use]
    pub fn derive(room_id: &RoomId) -> Self {
        let digest = Sha256::digest(room_id.as_str().as_bytes());
        Self(hex::encode(digest))
    }
}

impl PeerId {
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(12))
    }
}

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Map a transport codec type; `Unspecified` has no track kind.
    #[must_use]
    pub const fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(Self::Audio),
            RTPCodecType::Video => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a published track inside a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub kind: TrackKind,
    pub id: String,
}

impl TrackKey {
    pub fn new(kind: TrackKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::new(TrackKind::Video, id)
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, id)
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_is_deterministic() {
        let room = RoomId::from("r1");
        let a = StreamId::derive(&room);
        let b = StreamId::derive(&RoomId::from("r1".to_string()));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, StreamId::derive(&RoomId::from("r2")));
    }

    #[test]
    fn test_stream_id_known_digest() {
        // sha256("abc")
        let id = StreamId::derive(&RoomId::from("abc"));
        assert_eq!(
            id.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_track_kind_mapping() {
        assert_eq!(
            TrackKind::from_codec_type(RTPCodecType::Video),
            Some(TrackKind::Video)
        );
        assert_eq!(
            TrackKind::from_codec_type(RTPCodecType::Audio),
            Some(TrackKind::Audio)
        );
        assert_eq!(TrackKind::from_codec_type(RTPCodecType::Unspecified), None);
    }

    #[test]
    fn test_track_key_display() {
        assert_eq!(TrackKey::video("cam").to_string(), "video/cam");
        assert_ne!(TrackKey::video("x"), TrackKey::audio("x"));
    }

    #[test]
    fn test_peer_ids_are_unique() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }
}
