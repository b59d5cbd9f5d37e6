//! Inbound frame decoding for diagnostics and acknowledgment detection.
//!
//! Decoding is table driven: [`DECODERS`] maps an opcode to a label and an
//! optional layout decoder. Adding a frame type means adding a row.

use chrono::Local;
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::Serialize;

use crate::core::protocol::frames::{describe_screen_status, Command, SubCommand, MIC_ENABLE, RESPONSE_SUCCESS};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

type DecodeFn = fn(&[u8]) -> Result<Option<FrameDetail>, String>;

/// One row of the decoder table
pub struct FrameDecoder {
    pub opcode: u8,
    pub label: &'static str,
    pub decode: Option<DecodeFn>,
}

pub const DECODERS: &[FrameDecoder] = &[
    FrameDecoder {
        opcode: Command::StartAi as u8,
        label: "Start Even AI",
        decode: Some(decode_start_ai),
    },
    FrameDecoder {
        opcode: Command::OpenMic as u8,
        label: "Mic Control",
        decode: Some(decode_mic_control),
    },
    FrameDecoder {
        opcode: Command::ReceiveMicData as u8,
        label: "Mic Data",
        decode: None,
    },
    FrameDecoder {
        opcode: Command::Init as u8,
        label: "Initialize",
        decode: None,
    },
    FrameDecoder {
        opcode: Command::Heartbeat as u8,
        label: "Heartbeat",
        decode: None,
    },
    FrameDecoder {
        opcode: Command::SendResult as u8,
        label: "AI Result",
        decode: Some(decode_ai_result),
    },
    FrameDecoder {
        opcode: Command::QuickNote as u8,
        label: "Quick Note",
        decode: None,
    },
    FrameDecoder {
        opcode: Command::Dashboard as u8,
        label: "Dashboard",
        decode: None,
    },
    FrameDecoder {
        opcode: Command::Notification as u8,
        label: "Notification",
        decode: Some(decode_notification),
    },
];

pub fn find_decoder(opcode: u8) -> Option<&'static FrameDecoder> {
    DECODERS.iter().find(|d| d.opcode == opcode)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub hex: String,
    pub int: Option<u8>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawInfo {
    pub hex: String,
    pub pretty_hex: String,
    pub int_array: Vec<u8>,
    pub crc32: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenStatusInfo {
    pub action: u8,
    pub ai_status: u8,
    pub description: String,
}

/// Opcode-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameDetail {
    StartAi {
        subcmd: Option<u8>,
        description: String,
    },
    MicControl {
        enable: Option<u8>,
        status: String,
    },
    AiResult {
        sequence: u8,
        total_packages: u8,
        current_package: u8,
        screen_status: ScreenStatusInfo,
        page_current: u8,
        page_total: u8,
    },
    Notification {
        notify_id: u8,
        total_chunks: u8,
        current_chunk: u8,
    },
}

/// Everything known about one inbound packet. Never fails to build: problems
/// end up in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameDiagnostics {
    pub timestamp: String,
    pub command: CommandInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<FrameDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameDiagnostics {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp(),
            command: CommandInfo {
                hex: String::new(),
                int: None,
                kind: "Error".to_string(),
            },
            raw: None,
            detail: None,
            error: Some(message.into()),
        }
    }
}

/// Decode one inbound packet
pub fn parse_frame(data: &[u8]) -> FrameDiagnostics {
    let Some(&opcode) = data.first() else {
        return FrameDiagnostics::error("Empty data received");
    };

    let decoder = find_decoder(opcode);
    let kind = decoder
        .map(|d| d.label.to_string())
        .unwrap_or_else(|| format!("Unknown command: 0x{:02X}", opcode));

    let (detail, error) = match decoder.and_then(|d| d.decode) {
        Some(decode) => match decode(data) {
            Ok(detail) => (detail, None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };

    FrameDiagnostics {
        timestamp: timestamp(),
        command: CommandInfo {
            hex: format!("0x{:02X}", opcode),
            int: Some(opcode),
            kind,
        },
        raw: Some(raw_info(data)),
        detail,
        error,
    }
}

/// A packet starting with the SUCCESS status byte acknowledges the last write
pub fn is_acknowledgment(data: &[u8]) -> bool {
    data.first() == Some(&RESPONSE_SUCCESS)
}

fn raw_info(data: &[u8]) -> RawInfo {
    RawInfo {
        hex: to_hex(data),
        pretty_hex: data
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" "),
        int_array: data.to_vec(),
        crc32: format!("0x{:08x}", CRC32.checksum(data)),
    }
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn decode_start_ai(data: &[u8]) -> Result<Option<FrameDetail>, String> {
    let subcmd = data.get(1).copied();
    let description = match subcmd {
        Some(byte) => SubCommand::from_byte(byte)
            .map(|s| s.description().to_string())
            .unwrap_or_else(|| format!("Unknown subcmd: 0x{:02X}", byte)),
        None => "No subcmd".to_string(),
    };
    Ok(Some(FrameDetail::StartAi { subcmd, description }))
}

fn decode_mic_control(data: &[u8]) -> Result<Option<FrameDetail>, String> {
    let enable = data.get(1).copied();
    let status = if enable == Some(MIC_ENABLE) {
        "Enable MIC"
    } else {
        "Disable MIC"
    };
    Ok(Some(FrameDetail::MicControl {
        enable,
        status: status.to_string(),
    }))
}

fn decode_ai_result(data: &[u8]) -> Result<Option<FrameDetail>, String> {
    if data.len() < 9 {
        return Err(format!("AI result frame too short: {} bytes, expected at least 9", data.len()));
    }
    let status = data[4];
    Ok(Some(FrameDetail::AiResult {
        sequence: data[1],
        total_packages: data[2],
        current_package: data[3],
        screen_status: ScreenStatusInfo {
            action: status & 0x0F,
            ai_status: status & 0xF0,
            description: describe_screen_status(status),
        },
        page_current: data[7],
        page_total: data[8],
    }))
}

fn decode_notification(data: &[u8]) -> Result<Option<FrameDetail>, String> {
    if data.len() < 4 {
        return Err(format!(
            "Notification frame too short: {} bytes, expected at least 4",
            data.len()
        ));
    }
    Ok(Some(FrameDetail::Notification {
        notify_id: data[1],
        total_chunks: data[2],
        current_chunk: data[3],
    }))
}
