//! Phone-style notifications: JSON record and chunked frames.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::core::protocol::frames::{Frame, MAX_NOTIFICATION_CHUNK};
use crate::error::GlassesError;

/// Notification id carried in every chunk header
pub const NOTIFY_ID: u8 = 0;

/// The notification body the lenses render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcsNotification {
    pub msg_id: u32,
    #[serde(rename = "type")]
    pub kind: u8,
    pub app_identifier: String,
    pub title: String,
    pub subtitle: String,
    pub message: String,
    /// Seconds since the epoch
    pub time_s: i64,
    /// Local time formatted as `%Y-%m-%d %H:%M:%S`
    pub date: String,
    pub display_name: String,
}

impl NcsNotification {
    /// Build a notification stamped with the current time
    pub fn new(
        msg_id: u32,
        app_identifier: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        message: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Local::now();
        Self {
            msg_id,
            kind: 1,
            app_identifier: app_identifier.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            message: message.into(),
            time_s: now.timestamp(),
            date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            display_name: display_name.into(),
        }
    }
}

/// Envelope sent to the lenses; `type` is always "Add".
#[derive(Debug, Clone, Serialize)]
struct NotificationEnvelope<'a> {
    ncs_notification: &'a NcsNotification,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Compact JSON bytes of the notification envelope
pub fn notification_json(notification: &NcsNotification) -> Result<Vec<u8>, GlassesError> {
    let envelope = NotificationEnvelope {
        ncs_notification: notification,
        kind: "Add",
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Split a payload into notification frames of at most `chunk_size` bytes each.
pub fn chunk_payload(payload: &[u8], chunk_size: usize) -> Result<Vec<Frame>, GlassesError> {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<&[u8]> = payload.chunks(chunk_size).collect();
    let total_chunks = u8::try_from(chunks.len()).map_err(|_| GlassesError::PayloadTooLarge {
        chunks: chunks.len(),
        max: u8::MAX as usize,
    })?;

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| Frame::Notification {
            notify_id: NOTIFY_ID,
            total_chunks,
            // bounded by total_chunks above
            chunk_index: index as u8,
            chunk: chunk.to_vec(),
        })
        .collect())
}

/// Serialize and chunk a notification for sending
pub fn build_notification_frames(notification: &NcsNotification) -> Result<Vec<Frame>, GlassesError> {
    let json = notification_json(notification)?;
    chunk_payload(&json, MAX_NOTIFICATION_CHUNK)
}
