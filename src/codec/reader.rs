//! Frame extraction from the read half of a transport.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Reads complete frames off an async stream, buffering partial data.
///
/// Incoming frames are validated before their payload is buffered: a server
/// must not mask, reserved bits must be clear (no extensions are ever
/// negotiated), and the declared length must fit the configured frame limit.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    limits: Limits,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, limits: Limits, buffer_size: usize) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(buffer_size),
            limits,
        }
    }

    /// Create a reader seeded with bytes that arrived bundled with the
    /// upgrade response. Servers may start sending frames immediately after
    /// the `101`, and those bytes must not be lost.
    #[must_use]
    pub fn with_leftover(io: R, limits: Limits, buffer_size: usize, leftover: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(buffer_size.max(leftover.len()));
        buf.extend_from_slice(leftover);
        Self { io, buf, limits }
    }

    /// Check wire metadata that is visible before the full frame is buffered.
    fn precheck(&self) -> Result<()> {
        let byte1 = self.buf[1];

        if byte1 & 0x80 != 0 {
            return Err(Error::MaskedServerFrame);
        }

        let declared_len = match byte1 & 0x7F {
            len @ 0..=125 => Some(len as usize),
            126 if self.buf.len() >= 4 => {
                Some(u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize)
            }
            127 if self.buf.len() >= 10 => {
                let len = u64::from_be_bytes([
                    self.buf[2],
                    self.buf[3],
                    self.buf[4],
                    self.buf[5],
                    self.buf[6],
                    self.buf[7],
                    self.buf[8],
                    self.buf[9],
                ]);
                Some(usize::try_from(len).map_err(|_| Error::PayloadTooLargeForPlatform {
                    size: len,
                    max: usize::MAX as u64,
                })?)
            }
            _ => None,
        };

        if let Some(len) = declared_len {
            self.limits.check_frame_size(len)?;
        }

        Ok(())
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] when the transport reaches EOF
    /// - [`Error::MaskedServerFrame`] / [`Error::FrameTooLarge`] /
    ///   frame-structure errors on protocol violations
    /// - [`Error::Io`] on transport faults
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.buf.len() >= 2 {
                self.precheck()?;

                match Frame::parse(&self.buf) {
                    Ok((frame, consumed)) => {
                        self.buf.advance(consumed);
                        frame.validate()?;
                        return Ok(frame);
                    }
                    Err(Error::IncompleteFrame { .. }) => {}
                    Err(e) => return Err(e),
                }
            }

            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }
}
