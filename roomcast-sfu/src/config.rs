//! SFU Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SFU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// STUN/TURN URLs handed to every server-side peer connection
    pub ice_servers: Vec<String>,
    /// Period of the process-wide key-frame request tick
    pub key_frame_interval_secs: u64,
    /// Period of the viewer-count side channel
    pub viewer_count_interval_secs: u64,
    /// Upper bound on renegotiation passes per round
    pub max_renegotiation_passes: usize,
    /// Outbound queue length of one chat client
    pub chat_client_buffer: usize,
    /// Largest accepted chat message in bytes
    pub chat_max_message_size: usize,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            key_frame_interval_secs: 3,
            viewer_count_interval_secs: 1,
            max_renegotiation_passes: 8,
            chat_client_buffer: 256,
            chat_max_message_size: 512,
        }
    }
}

impl SfuConfig {
    #[must_use]
    pub const fn key_frame_interval(&self) -> Duration {
        Duration::from_secs(self.key_frame_interval_secs)
    }

    #[must_use]
    pub const fn viewer_count_interval(&self) -> Duration {
        Duration::from_secs(self.viewer_count_interval_secs)
    }

    /// Collect every invalid setting instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.key_frame_interval_secs == 0 {
            errors.push("sfu.key_frame_interval_secs must be greater than 0".to_string());
        }
        if self.viewer_count_interval_secs == 0 {
            errors.push("sfu.viewer_count_interval_secs must be greater than 0".to_string());
        }
        if self.max_renegotiation_passes == 0 {
            errors.push("sfu.max_renegotiation_passes must be at least 1".to_string());
        }
        if self.chat_client_buffer == 0 {
            errors.push("sfu.chat_client_buffer must be greater than 0".to_string());
        }
        for url in &self.ice_servers {
            if !(url.starts_with("stun:") || url.starts_with("turn:") || url.starts_with("turns:")) {
                errors.push(format!("sfu.ice_servers: unsupported URL scheme in {url:?}"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
