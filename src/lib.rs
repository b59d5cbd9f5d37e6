//! Even G1 glasses bridge library
//! Session management for the two BLE lenses of a pair of Even G1 glasses
//! and the display protocol spoken over them.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::core::bluetooth::{BluestBackend, GlassesManager, SessionEvent, Side};
pub use crate::core::commands::CommandExecutor;
pub use crate::error::{ConnectionError, GlassesError, Result};
