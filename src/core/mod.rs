//! Core functionality for the glasses bridge
//! Session management over BLE, the wire protocol and the display commands.

pub mod bluetooth;
pub mod commands;
pub mod protocol;

// Re-export commonly used types
pub use bluetooth::GlassesManager;
pub use commands::CommandExecutor;
