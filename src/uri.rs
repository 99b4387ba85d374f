//! Endpoint URI parsing.
//!
//! Accepts `ws`/`wss` URIs plus their `http`/`https` aliases, which some
//! embedding runtimes hand straight through. Explicit ports override the
//! scheme default; a missing path becomes `/`.

use url::Url;

use crate::error::{Error, Result};

/// A parsed WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUri {
    /// Whether the connection must be wrapped in TLS.
    pub secure: bool,
    /// Host name presented for resolution and SNI.
    pub host: String,
    /// TCP port (explicit, or the scheme default).
    pub port: u16,
    /// Request target for the upgrade: path plus any query string.
    pub path: String,
}

impl EndpointUri {
    /// Parse an endpoint URI.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUri`] if the URI does not parse or has no host.
    /// - [`Error::UnsupportedScheme`] for schemes other than
    ///   `ws`/`wss`/`http`/`https`.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)?;

        let (secure, default_port) = match url.scheme() {
            "ws" | "http" => (false, 80),
            "wss" | "https" => (true, 443),
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUri(format!("missing host in {uri}")))?
            .to_string();

        let port = url.port().unwrap_or(default_port);

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// `Host` header value: the port is elided when it is the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ws_defaults() {
        let uri = EndpointUri::parse("ws://example.test/socket").unwrap();
        assert!(!uri.secure);
        assert_eq!(uri.host, "example.test");
        assert_eq!(uri.port, 80);
        assert_eq!(uri.path, "/socket");
    }

    #[test]
    fn test_parse_wss_defaults() {
        let uri = EndpointUri::parse("wss://example.test/socket").unwrap();
        assert!(uri.secure);
        assert_eq!(uri.port, 443);
    }

    #[test]
    fn test_http_https_aliases() {
        assert!(!EndpointUri::parse("http://example.test/").unwrap().secure);
        assert!(EndpointUri::parse("https://example.test/").unwrap().secure);
    }

    #[test]
    fn test_explicit_port() {
        let uri = EndpointUri::parse("ws://example.test:9001/chat").unwrap();
        assert_eq!(uri.port, 9001);
        assert_eq!(uri.host_header(), "example.test:9001");
    }

    #[test]
    fn test_missing_path_defaults_to_root() {
        let uri = EndpointUri::parse("ws://example.test").unwrap();
        assert_eq!(uri.path, "/");
    }

    #[test]
    fn test_query_preserved_in_target() {
        let uri = EndpointUri::parse("wss://example.test/feed?token=abc").unwrap();
        assert_eq!(uri.path, "/feed?token=abc");
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = EndpointUri::parse("ftp://example.test/file");
        assert!(matches!(result, Err(Error::UnsupportedScheme(s)) if s == "ftp"));
    }

    #[test]
    fn test_invalid_uri() {
        assert!(matches!(
            EndpointUri::parse("not a uri"),
            Err(Error::InvalidUri(_))
        ));
    }

    #[test]
    fn test_host_header_elides_default_port() {
        let uri = EndpointUri::parse("wss://example.test/socket").unwrap();
        assert_eq!(uri.host_header(), "example.test");
    }

    #[test]
    fn test_display() {
        let uri = EndpointUri::parse("ws://example.test:8080/x").unwrap();
        assert_eq!(uri.to_string(), "ws://example.test:8080/x");
    }
}
