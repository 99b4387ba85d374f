//! TLS support for wss:// connections.
//!
//! Two backends, selected at compile time:
//!
//! - **rustls** (feature `tls-rustls`, default): pure Rust, TLS 1.2/1.3
//! - **native-tls** (feature `tls-native`): platform TLS
//!   (OpenSSL/Schannel/Security.framework), floor at TLS 1.1
//!
//! Both present the target host for SNI. Certificate verification follows
//! [`Config::verify_certificates`](crate::Config::verify_certificates) and
//! defaults to strict.

#[cfg(feature = "tls-rustls")]
mod rustls_impl;

#[cfg(feature = "tls-native")]
mod native;

use tokio::net::TcpStream;

use crate::client::Transport;
use crate::config::Config;
use crate::error::Result;

/// Wrap a connected TCP stream in TLS for `host`.
#[cfg(feature = "tls-rustls")]
pub(crate) async fn connect(config: &Config, host: &str, stream: TcpStream) -> Result<Transport> {
    rustls_impl::connect(config.verify_certificates, host, stream).await
}

/// Wrap a connected TCP stream in TLS for `host`.
#[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
pub(crate) async fn connect(config: &Config, host: &str, stream: TcpStream) -> Result<Transport> {
    native::connect(config.verify_certificates, host, stream).await
}

/// No TLS backend compiled in: every wss:// attempt fails fast.
#[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
pub(crate) async fn connect(_config: &Config, _host: &str, _stream: TcpStream) -> Result<Transport> {
    Err(crate::error::Error::Tls(
        "no TLS backend compiled in; enable the tls-rustls or tls-native feature".into(),
    ))
}
