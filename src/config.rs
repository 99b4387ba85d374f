//! Configuration and limits for the WebSocket client.

use std::time::Duration;

/// Resource limits applied to inbound protocol data.
///
/// These limits prevent a misbehaving peer from exhausting memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the upgrade response in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Timeout covering the whole establishment chain: resolution,
    /// transport connect, TLS handshake and WebSocket upgrade.
    ///
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Verify the server certificate chain and hostname on TLS connections.
    ///
    /// Disabling this accepts any certificate the server presents and is a
    /// deployment hazard; it exists for test rigs and pinned-environment
    /// debugging only.
    ///
    /// Default: true
    pub verify_certificates: bool,

    /// Value of the `User-Agent` header sent with the upgrade request.
    ///
    /// Default: `wsline/<crate version>`
    pub user_agent: String,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Write buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub write_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            connect_timeout: Duration::from_secs(30),
            verify_certificates: true,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            read_buffer_size: 8192,
            write_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the establishment timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable server certificate verification.
    #[must_use]
    pub const fn with_verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Set the `User-Agent` header value for the upgrade request.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set write buffer size.
    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_check_message_size() {
        let limits = Limits::default();
        assert!(limits.check_message_size(1024).is_ok());
        assert!(limits.check_message_size(100 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_limits_check_frame_size() {
        let limits = Limits::default();
        assert!(limits.check_frame_size(1024).is_ok());
        assert!(limits.check_frame_size(20 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_limits_check_fragment_count() {
        let limits = Limits::default();
        assert!(limits.check_fragment_count(50).is_ok());
        assert!(limits.check_fragment_count(200).is_err());
    }

    #[test]
    fn test_limits_check_handshake_size() {
        let limits = Limits::default();
        assert!(limits.check_handshake_size(1024).is_ok());
        assert!(limits.check_handshake_size(10000).is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert!(config.verify_certificates);
        assert!(config.user_agent.starts_with("wsline/"));
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.write_buffer_size, 8192);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_limits(Limits::new(1024, 4096, 8, 2048))
            .with_connect_timeout(Duration::from_secs(5))
            .with_verify_certificates(false)
            .with_user_agent("probe/1.0");

        assert_eq!(config.limits.max_frame_size, 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.verify_certificates);
        assert_eq!(config.user_agent, "probe/1.0");
    }

    #[test]
    fn test_config_buffer_size() {
        let config = Config::new()
            .with_read_buffer_size(1024)
            .with_write_buffer_size(2048);

        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 2048);
    }
}
