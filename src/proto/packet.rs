use std::fmt::{self, Display, Formatter};

use super::error_code::ErrorCode;
use crate::record::ByteOrder;

/// Size of every server packet before any extra reply or event data.
pub const PACKET_LEN: usize = 32;

const X_ERROR: u8 = 0;
const X_REPLY: u8 = 1;
const KEYMAP_NOTIFY: u8 = 11;
const GENERIC_EVENT: u8 = 35;
const SEND_EVENT_MASK: u8 = 0x80;

fn u16_at(buf: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let bytes = [buf[offset], buf[offset + 1]];
    match order {
        ByteOrder::LsbFirst => u16::from_le_bytes(bytes),
        ByteOrder::MsbFirst => u16::from_be_bytes(bytes),
    }
}

fn u32_at(buf: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
    match order {
        ByteOrder::LsbFirst => u32::from_le_bytes(bytes),
        ByteOrder::MsbFirst => u32::from_be_bytes(bytes),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Error,
    Reply,
    Event,
}

/// Classification of a 32-byte server packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Low 16 bits of request sequence, absent for KeymapNotify.
    pub sequence: Option<u16>,
    /// Bytes following the 32-byte packet.
    pub extra_len: usize,
}

impl PacketHeader {
    pub fn parse(buf: &[u8; PACKET_LEN], order: ByteOrder) -> Self {
        let response_type = buf[0] & !SEND_EVENT_MASK;
        let sequence = u16_at(buf, 2, order);
        match buf[0] {
            X_ERROR => PacketHeader { kind: PacketKind::Error, sequence: Some(sequence), extra_len: 0 },
            X_REPLY => {
                let extra_len = u32_at(buf, 4, order) as usize * 4;
                PacketHeader { kind: PacketKind::Reply, sequence: Some(sequence), extra_len }
            },
            _ => {
                let extra_len = if response_type == GENERIC_EVENT { u32_at(buf, 4, order) as usize * 4 } else { 0 };
                let sequence = if response_type == KEYMAP_NOTIFY { None } else { Some(sequence) };
                PacketHeader { kind: PacketKind::Event, sequence, extra_len }
            },
        }
    }
}

/// Error reported by server for a request.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProtocolError {
    pub error_code: u8,
    pub sequence: u64,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl ProtocolError {
    pub fn decode(buf: &[u8], sequence: u64, order: ByteOrder) -> Self {
        ProtocolError {
            error_code: buf[1],
            sequence,
            bad_value: u32_at(buf, 4, order),
            minor_opcode: u16_at(buf, 8, order),
            major_opcode: buf[10],
        }
    }

    /// Core error code, `None` for extension errors.
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::try_from(self.error_code).ok()
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "Bad{}", code)?,
            None => write!(f, "error {}", self.error_code)?,
        }
        write!(
            f,
            " for request {}.{} with sequence {}, bad value {:#x}",
            self.major_opcode, self.minor_opcode, self.sequence, self.bad_value
        )
    }
}

/// Raw event packet with its widened sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    bytes: Vec<u8>,
    sequence: Option<u64>,
}

impl Event {
    pub(crate) fn new(bytes: Vec<u8>, sequence: Option<u64>) -> Self {
        Event { bytes, sequence }
    }

    /// Event code with SendEvent flag cleared.
    pub fn response_type(&self) -> u8 {
        self.bytes[0] & !SEND_EVENT_MASK
    }

    pub fn is_send_event(&self) -> bool {
        self.bytes[0] & SEND_EVENT_MASK != 0
    }

    pub fn is_generic(&self) -> bool {
        self.response_type() == GENERIC_EVENT
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
