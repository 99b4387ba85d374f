//! Reassembly of fragmented messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// A fully reassembled message.
pub struct AssembledMessage {
    /// Opcode of the first fragment: Text or Binary.
    pub opcode: OpCode,
    /// Concatenated payload of all fragments, in arrival order.
    pub payload: Vec<u8>,
}

/// Accumulates data frames until a FIN fragment completes the message.
///
/// Control frames may be interleaved between fragments and are ignored
/// here; the read loop handles them before the assembler sees anything.
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` when the frame carries FIN, `None` while
    /// more fragments are expected.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] for a continuation with no message in
    ///   progress, or a fresh opcode while one is
    /// - [`Error::TooManyFragments`] / [`Error::MessageTooLarge`] when
    ///   limits are exceeded
    /// - [`Error::InvalidUtf8`] when a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            self.opcode = Some(frame.opcode);
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;

        let new_size = self.buffer.len() + frame.payload().len();
        self.limits.check_message_size(new_size)?;

        let fin = frame.fin;
        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if fin {
            let payload = self.buffer.split().to_vec();
            let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
            self.fragment_count = 0;

            if opcode == OpCode::Text && std::str::from_utf8(&payload).is_err() {
                return Err(Error::InvalidUtf8);
            }

            Ok(Some(AssembledMessage { opcode, payload }))
        } else {
            Ok(None)
        }
    }

    /// Whether a message is partially assembled.
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}
