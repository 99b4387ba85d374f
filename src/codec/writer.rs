//! Masked frame emission on the write half of a transport.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::Frame;

/// Seed for mask generation. Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
    }
}

/// Writes client frames, masking every one with a fresh key as RFC 6455
/// requires of clients.
pub struct FrameWriter<W> {
    io: W,
    buf: BytesMut,
    mask_counter: u32,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, buffer_size: usize) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(buffer_size),
            mask_counter: random_mask_seed(),
        }
    }

    /// Weyl-sequence counter mixed through two rounds of multiply-xorshift.
    /// Masks need to be unpredictable enough to defeat proxy cache
    /// poisoning, not cryptographically strong.
    fn next_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Serialize and write one frame, masked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) on transport faults.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.next_mask();
        let wire_size = frame.wire_size(true);

        self.buf.clear();
        self.buf.resize(wire_size, 0);
        let written = frame.write(&mut self.buf, Some(mask))?;

        self.io.write_all(&self.buf[..written]).await?;
        Ok(())
    }

    /// Flush buffered bytes to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) on transport faults.
    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write side. Best-effort, used after a clean close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) on transport faults.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
