//! WebSocket frame opcodes as defined in RFC 6455.

use crate::error::{Error, Result};

/// WebSocket frame opcode.
///
/// Defines the interpretation of the payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// Continuation frame (0x0), used after the initial fragment.
    Continuation = 0x0,
    /// Text frame (0x1). Payload must be valid UTF-8.
    Text = 0x1,
    /// Binary frame (0x2). Payload is arbitrary bytes.
    Binary = 0x2,
    /// Close frame (0x8). May carry a status code and reason.
    Close = 0x8,
    /// Ping frame (0x9). Receiver must answer with a Pong.
    Ping = 0x9,
    /// Pong frame (0xA). Response to Ping, may arrive unsolicited.
    Pong = 0xA,
}

impl OpCode {
    /// Create an `OpCode` from a raw nibble.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedOpcode`] for 0x3-0x7 and 0xB-0xF, and
    /// [`Error::InvalidOpcode`] for anything above a nibble.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x3..=0x7 => Err(Error::ReservedOpcode(byte)),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            0xB..=0xF => Err(Error::ReservedOpcode(byte)),
            _ => Err(Error::InvalidOpcode(byte)),
        }
    }

    /// Raw nibble value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Control frame opcodes: Close, Ping, Pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Data frame opcodes: Continuation, Text, Binary.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }
}
