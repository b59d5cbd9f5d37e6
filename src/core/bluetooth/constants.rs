//! Constants used throughout the bridge
//! This module contains the UUIDs, timing defaults and size limits of the
//! glasses link.

use uuid::Uuid;

/// Default advertised names of the two lenses
pub const DEFAULT_LEFT_NAME: &str = "G1 Left Glass";
pub const DEFAULT_RIGHT_NAME: &str = "G1 Right Glass";

/// Substrings of an advertised name that identify the lens side
pub const LEFT_NAME_MARKER: &str = "_L_";
pub const RIGHT_NAME_MARKER: &str = "_R_";

/// The UUID of the Nordic UART service exposed by each lens
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the UART write characteristic (host -> lens)
pub const UART_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the UART notify characteristic (lens -> host)
pub const UART_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Maximum number of reconnection attempts after an unsolicited disconnect
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Delay between reconnection attempts in seconds
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// Timeout for resolving a pre-configured device that was not seen in a scan
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Largest single write accepted by the lenses
pub const MAX_WRITE_SIZE: usize = 180;

/// Depth of the per-link inbound queue used for acknowledgment waits
pub const ACK_QUEUE_DEPTH: usize = 32;

/// Depth of the channel carrying raw notifications out of the transport
pub const NOTIFICATION_CHANNEL_DEPTH: usize = 64;

/// Buffered session events per subscriber
pub const EVENT_CHANNEL_DEPTH: usize = 64;
