use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    DEFAULT_HEARTBEAT_SECS, DEFAULT_LEFT_NAME, DEFAULT_RIGHT_NAME, DEFAULT_SCAN_DURATION_SECS,
    LEFT_NAME_MARKER, RIGHT_NAME_MARKER,
};
use crate::core::bluetooth::reconnect::ReconnectPolicy;
use crate::core::bluetooth::Side;
use crate::error::{GlassesError, Result};

/// When `scan_and_connect` counts as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Every launched connect must succeed
    #[default]
    RequireAll,
    /// One connected side is enough
    AnySide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlassesConfig {
    /// Address of the left lens, connected without discovery when set
    pub left_address: Option<String>,
    pub right_address: Option<String>,

    pub left_name: String,
    pub right_name: String,

    /// Advertised-name substrings that assign a discovered device to a side
    pub left_marker: String,
    pub right_marker: String,

    pub heartbeat_freq_secs: u64,
    pub scan_timeout_secs: u64,

    pub reconnect: ReconnectPolicy,
    pub connect_policy: ConnectPolicy,
}

impl Default for GlassesConfig {
    fn default() -> Self {
        Self {
            left_address: None,
            right_address: None,
            left_name: DEFAULT_LEFT_NAME.to_string(),
            right_name: DEFAULT_RIGHT_NAME.to_string(),
            left_marker: LEFT_NAME_MARKER.to_string(),
            right_marker: RIGHT_NAME_MARKER.to_string(),
            heartbeat_freq_secs: DEFAULT_HEARTBEAT_SECS,
            scan_timeout_secs: DEFAULT_SCAN_DURATION_SECS,
            reconnect: ReconnectPolicy::default(),
            connect_policy: ConnectPolicy::default(),
        }
    }
}

impl GlassesConfig {
    pub fn address(&self, side: Side) -> Option<&str> {
        match side {
            Side::Left => self.left_address.as_deref(),
            Side::Right => self.right_address.as_deref(),
        }
    }

    pub fn name(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_name,
            Side::Right => &self.right_name,
        }
    }

    pub fn marker(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_marker,
            Side::Right => &self.right_marker,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_freq_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_freq_secs == 0 {
            return Err(GlassesError::InvalidConfig(
                "heartbeat_freq_secs must be at least 1".to_string(),
            ));
        }
        if self.left_marker.is_empty() || self.right_marker.is_empty() {
            return Err(GlassesError::InvalidConfig(
                "side markers must not be empty".to_string(),
            ));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(GlassesError::InvalidConfig(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
