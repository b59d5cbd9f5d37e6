//! Application-level wire protocol of the lenses
//! Frame layouts, text paging, RSVP grouping, notification chunking and
//! inbound decoding. Nothing in here touches the radio.

pub mod frames;
pub mod notification;
pub mod parser;
pub mod rsvp;
pub mod text;

pub use frames::{Command, Frame, SubCommand, TextResult};
pub use notification::NcsNotification;
pub use parser::{is_acknowledgment, parse_frame, FrameDiagnostics};
pub use rsvp::RsvpConfig;
pub use text::format_text_lines;
