//! Client side of the WebSocket upgrade handshake (RFC 6455 Section 4).

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, base64-encoded.
///
/// # Errors
///
/// Returns [`Error::Io`] if the system randomness source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::Io(format!("random key generation failed: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Computes the Sec-WebSocket-Accept value from the client's key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsline::protocol::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Parse HTTP headers from an iterator of lines into a case-insensitive map.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    headers
}

/// The HTTP Upgrade request sent by the client.
///
/// No extension or sub-protocol headers are emitted: the client negotiates
/// raw RFC 6455 framing only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Value of the `Host` header.
    pub host: String,
    /// Request target: path plus any query string.
    pub path: String,
    /// The Sec-WebSocket-Key nonce.
    pub key: String,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl UpgradeRequest {
    /// Build a request for the given target with a fresh key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if key generation fails.
    pub fn new(
        host: impl Into<String>,
        path: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            host: host.into(),
            path: path.into(),
            key: generate_key()?,
            user_agent: user_agent.into(),
        })
    }

    /// Serialize the request into wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             User-Agent: {}\r\n\
             \r\n",
            self.path, self.host, self.key, self.user_agent
        )
        .into_bytes()
    }
}

/// Parsed WebSocket upgrade response from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol (unused by this client).
    pub protocol: Option<String>,
}

impl UpgradeResponse {
    /// Parse a WebSocket upgrade response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8.
    /// - The status code is not `101 Switching Protocols`.
    /// - Required headers are missing or invalid: `Upgrade`, `Connection`,
    ///   `Sec-WebSocket-Accept`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        let protocol = headers.get("sec-websocket-protocol").cloned();

        Ok(Self { accept, protocol })
    }

    /// Verify the accept value against the key the request was sent with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on a mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        let expected = compute_accept_key(key);
        if self.accept == expected {
            Ok(())
        } else {
            Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {expected}, got {}",
                self.accept
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_accept_key_rfc_example() {
        // RFC 6455 Section 1.3 example
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_generate_key_is_16_bytes() {
        let key = generate_key().unwrap();
        let decoded = BASE64.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_generate_key_varies() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_to_bytes() {
        let req = UpgradeRequest {
            host: "server.example.com".to_string(),
            path: "/chat".to_string(),
            key: "dGhlIHNhbXBsZSBub25jZQ==".to_string(),
            user_agent: "wsline/0.3.2".to_string(),
        };

        let text = String::from_utf8(req.to_bytes()).unwrap();
        assert!(text.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(text.contains("Host: server.example.com\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.contains("User-Agent: wsline/0.3.2\r\n"));
        assert!(!text.contains("Sec-WebSocket-Extensions"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_request_new_generates_key() {
        let req = UpgradeRequest::new("example.test", "/", "agent/1").unwrap();
        assert_eq!(BASE64.decode(&req.key).unwrap().len(), 16);
    }

    #[test]
    fn test_parse_response() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";

        let resp = UpgradeResponse::parse(response).unwrap();
        assert_eq!(resp.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(resp.protocol, None);
    }

    #[test]
    fn test_parse_response_case_insensitive_headers() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            UPGRADE: WebSocket\r\n\
            CONNECTION: upgrade\r\n\
            SEC-WEBSOCKET-ACCEPT: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";

        let resp = UpgradeResponse::parse(response).unwrap();
        assert_eq!(resp.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_parse_response_wrong_status() {
        let response = b"HTTP/1.1 403 Forbidden\r\n\r\n";
        let result = UpgradeResponse::parse(response);
        assert!(matches!(
            result,
            Err(Error::InvalidHandshake(msg)) if msg.contains("101")
        ));
    }

    #[test]
    fn test_parse_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";

        let result = UpgradeResponse::parse(response);
        assert!(matches!(
            result,
            Err(Error::InvalidHandshake(msg)) if msg.contains("Sec-WebSocket-Accept")
        ));
    }

    #[test]
    fn test_parse_response_missing_upgrade() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";

        let result = UpgradeResponse::parse(response);
        assert!(matches!(
            result,
            Err(Error::InvalidHandshake(msg)) if msg.contains("Upgrade")
        ));
    }

    #[test]
    fn test_verify_accept() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let good = UpgradeResponse {
            accept: "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".to_string(),
            protocol: None,
        };
        assert!(good.verify(key).is_ok());

        let bad = UpgradeResponse {
            accept: "bm90IHRoZSByaWdodCBrZXk=".to_string(),
            protocol: None,
        };
        assert!(matches!(bad.verify(key), Err(Error::InvalidHandshake(_))));
    }

    #[test]
    fn test_request_response_roundtrip() {
        let req = UpgradeRequest::new("server.example.com", "/chat", "wsline/test").unwrap();

        let response_text = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            compute_accept_key(&req.key)
        );

        let resp = UpgradeResponse::parse(response_text.as_bytes()).unwrap();
        assert!(resp.verify(&req.key).is_ok());
    }
}
