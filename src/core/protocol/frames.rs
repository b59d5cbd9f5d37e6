//! Outbound frame layouts
//! Every frame is an opcode byte, a fixed header and an optional payload.

use crate::core::bluetooth::constants::MAX_WRITE_SIZE;

/// Opcodes understood by the lenses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    StartAi = 0xF5,
    /// Mic control; the lens answers with the same opcode
    OpenMic = 0x0E,
    ReceiveMicData = 0xF1,
    Init = 0x4D,
    Heartbeat = 0x25,
    SendResult = 0x4E,
    QuickNote = 0x21,
    Dashboard = 0x22,
    Notification = 0x4B,
}

/// Subcommands of [`Command::StartAi`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubCommand {
    Exit = 0x00,
    PageControl = 0x01,
    Start = 0x17,
    Stop = 0x18,
}

impl SubCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Exit),
            0x01 => Some(Self::PageControl),
            0x17 => Some(Self::Start),
            0x18 => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Exit => "Exit to dashboard",
            Self::PageControl => "Page up/down control",
            Self::Start => "Start Even AI",
            Self::Stop => "Stop Even AI recording",
        }
    }
}

/// Status bytes sent back by the lenses
pub const RESPONSE_SUCCESS: u8 = 0xC9;
pub const RESPONSE_FAILURE: u8 = 0xCA;

pub const MIC_ENABLE: u8 = 0x01;
pub const MIC_DISABLE: u8 = 0x00;

/// Low nibble of the screen status byte
pub const SCREEN_NEW_CONTENT: u8 = 0x01;

/// High nibble of the screen status byte
pub const AI_DISPLAYING: u8 = 0x30;
pub const AI_DISPLAY_COMPLETE: u8 = 0x40;
pub const AI_MANUAL_MODE: u8 = 0x50;
pub const AI_NETWORK_ERROR: u8 = 0x60;

/// Marker byte in the middle of a heartbeat
pub const HEARTBEAT_MARKER: u8 = 0x04;
pub const HEARTBEAT_LENGTH: u16 = 6;

/// Header bytes in front of a TextResult payload
pub const TEXT_RESULT_HEADER_SIZE: usize = 9;

/// Header bytes in front of a notification chunk
pub const NOTIFICATION_HEADER_SIZE: usize = 4;

/// Largest TextResult payload that fits in one write
pub const MAX_TEXT_PAYLOAD: usize = MAX_WRITE_SIZE - TEXT_RESULT_HEADER_SIZE;

/// Largest JSON chunk that fits in one notification write
pub const MAX_NOTIFICATION_CHUNK: usize = MAX_WRITE_SIZE - NOTIFICATION_HEADER_SIZE;

/// Header of one text display packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResult {
    pub seq: u8,
    pub total_packages: u8,
    pub current_package: u8,
    pub screen_status: u8,
    pub new_char_pos0: u8,
    pub new_char_pos1: u8,
    pub page_number: u8,
    pub max_pages: u8,
    pub data: Vec<u8>,
}

impl Default for TextResult {
    fn default() -> Self {
        Self {
            seq: 0,
            total_packages: 1,
            current_package: 0,
            screen_status: SCREEN_NEW_CONTENT | AI_DISPLAYING,
            new_char_pos0: 0,
            new_char_pos1: 0,
            page_number: 1,
            max_pages: 1,
            data: Vec::new(),
        }
    }
}

/// One application-layer packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Heartbeat { seq: u8 },
    TextResult(TextResult),
    Notification {
        notify_id: u8,
        total_chunks: u8,
        chunk_index: u8,
        chunk: Vec<u8>,
    },
    StartAi { subcommand: SubCommand, param: Vec<u8> },
    MicControl { enable: bool },
}

impl Frame {
    pub fn command(&self) -> Command {
        match self {
            Self::Heartbeat { .. } => Command::Heartbeat,
            Self::TextResult(_) => Command::SendResult,
            Self::Notification { .. } => Command::Notification,
            Self::StartAi { .. } => Command::StartAi,
            Self::MicControl { .. } => Command::OpenMic,
        }
    }

    /// Convert the frame to its wire representation
    pub fn to_bytes(&self) -> Vec<u8> {
        let opcode = self.command() as u8;
        match self {
            Self::Heartbeat { seq } => {
                let [len_lo, len_hi] = HEARTBEAT_LENGTH.to_le_bytes();
                vec![opcode, len_lo, len_hi, *seq, HEARTBEAT_MARKER, *seq]
            }
            Self::TextResult(result) => {
                let mut bytes = Vec::with_capacity(TEXT_RESULT_HEADER_SIZE + result.data.len());
                bytes.extend_from_slice(&[
                    opcode,
                    result.seq,
                    result.total_packages,
                    result.current_package,
                    result.screen_status,
                    result.new_char_pos0,
                    result.new_char_pos1,
                    result.page_number,
                    result.max_pages,
                ]);
                bytes.extend_from_slice(&result.data);
                bytes
            }
            Self::Notification {
                notify_id,
                total_chunks,
                chunk_index,
                chunk,
            } => {
                let mut bytes = Vec::with_capacity(NOTIFICATION_HEADER_SIZE + chunk.len());
                bytes.extend_from_slice(&[opcode, *notify_id, *total_chunks, *chunk_index]);
                bytes.extend_from_slice(chunk);
                bytes
            }
            Self::StartAi { subcommand, param } => {
                let mut bytes = vec![opcode, *subcommand as u8];
                bytes.extend_from_slice(param);
                bytes
            }
            Self::MicControl { enable } => {
                vec![opcode, if *enable { MIC_ENABLE } else { MIC_DISABLE }]
            }
        }
    }
}

/// Human readable form of a packed screen status byte
pub fn describe_screen_status(status: u8) -> String {
    let action = if status & 0x0F == SCREEN_NEW_CONTENT {
        "New content"
    } else {
        "Unknown action"
    };
    let ai_state = match status & 0xF0 {
        AI_DISPLAYING => "Displaying (auto)",
        AI_DISPLAY_COMPLETE => "Complete",
        AI_MANUAL_MODE => "Manual mode",
        AI_NETWORK_ERROR => "Network error",
        _ => "Unknown AI status",
    };
    format!("{} - {}", action, ai_state)
}
