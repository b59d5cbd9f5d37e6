//! Error types shared across the bridge.

use thiserror::Error;

use crate::core::bluetooth::Side;

/// Failures while bringing a Link up.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("UART service {service} not found on {device}")]
    ServiceNotFound { device: String, service: uuid::Uuid },

    #[error("characteristic {characteristic} not found on {device}")]
    CharacteristicNotFound {
        device: String,
        characteristic: uuid::Uuid,
    },

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Top level error for session and display operations.
#[derive(Debug, Error)]
pub enum GlassesError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("no {0} glass configured")]
    MissingLink(Side),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("payload needs {chunks} chunks, at most {max} fit in one frame header")]
    PayloadTooLarge { chunks: usize, max: usize },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = GlassesError> = std::result::Result<T, E>;
