//! Unified plaintext/TLS transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// The stream a connection runs over: bare TCP or TCP wrapped in TLS.
/// TLS variants are boxed to keep the enum small.
pub enum Transport {
    /// Plain TCP (ws:// endpoints).
    Plain(TcpStream),
    /// rustls-wrapped TCP (wss:// endpoints, feature `tls-rustls`).
    #[cfg(feature = "tls-rustls")]
    Rustls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    /// native-tls-wrapped TCP (wss:// endpoints, feature `tls-native`).
    #[cfg(feature = "tls-native")]
    NativeTls(Box<tokio_native_tls::TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Transport::Rustls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            #[cfg(feature = "tls-native")]
            Transport::NativeTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            Transport::Rustls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            #[cfg(feature = "tls-native")]
            Transport::NativeTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            Transport::Rustls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            #[cfg(feature = "tls-native")]
            Transport::NativeTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            Transport::Rustls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            #[cfg(feature = "tls-native")]
            Transport::NativeTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain"),
            #[cfg(feature = "tls-rustls")]
            Transport::Rustls(_) => f.write_str("Transport::Rustls"),
            #[cfg(feature = "tls-native")]
            Transport::NativeTls(_) => f.write_str("Transport::NativeTls"),
        }
    }
}
