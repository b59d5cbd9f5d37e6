use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::protocol::rsvp::RsvpConfig;
use crate::error::Result;

/// Pacing of display writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Pause after each lens write of a text page
    pub inter_link_delay_ms: u64,
    /// Pause between pages of a multi-page message
    pub page_delay_secs: u64,
    /// Pause between notification chunks
    pub chunk_delay_ms: u64,
    pub ack_timeout_secs: u64,
    pub rsvp: RsvpConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            inter_link_delay_ms: 400,
            page_delay_secs: 5,
            chunk_delay_ms: 10,
            ack_timeout_secs: 5,
            rsvp: RsvpConfig::default(),
        }
    }
}

impl DisplayConfig {
    pub fn inter_link_delay(&self) -> Duration {
        Duration::from_millis(self.inter_link_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.rsvp.validate()
    }
}
