//! Error types for the WebSocket client.
//!
//! Errors split into two families that the client routes differently:
//! establishment errors (bad URI, resolution, connect timeout, TLS, upgrade)
//! surface through the `error` event, while runtime transport errors surface
//! through the `disconnected` event with close code 1006.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or running a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// URI scheme is not one of ws/wss/http/https.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// URI could not be parsed or is missing a host.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Host resolution produced no usable address.
    #[error("Resolution failed for {0}")]
    Resolve(String),

    /// The whole establishment chain exceeded the configured timeout.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid WebSocket upgrade exchange.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Upgrade response exceeded the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes buffered before giving up.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected on the inbound stream.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a completed text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// The transport reached EOF; the peer may have supplied a close code.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid opcode value on the wire.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved opcode used without negotiation.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC 6455 violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Server frames must arrive unmasked.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set; the client never negotiates extensions.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Declared payload length does not fit in this platform's usize.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload size.
        size: u64,
        /// Platform maximum.
        max: u64,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUri(err.to_string())
    }
}
