//! # wsline - Event-driven long-lived WebSocket client
//!
//! `wsline` maintains one logical WebSocket connection per client: it
//! resolves the endpoint, performs the TLS and upgrade handshakes, then runs
//! independent read and write activities over the shared transport and
//! reports everything back through a caller-supplied event sink.
//!
//! ## Features
//!
//! - **Non-blocking surface** - `connect`/`send`/`close` initiate work and
//!   return; outcomes arrive as events
//! - **Thread-safe mailbox** - received messages are reassembled and queued
//!   for non-blocking `receive()` polls
//! - **Exactly-once disconnect** - read errors, write errors, peer closes
//!   and explicit closes race to one guarded dispatch
//! - **Structured teardown** - activities are cancelled and joined, never
//!   detached
//! - **TLS** - rustls (default) or platform native-tls, SNI included,
//!   strict certificate verification by default
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsline::{Config, Event, Message, WebSocketClient};
//!
//! let client = WebSocketClient::new(Config::default(), |event: Event| {
//!     // runs on the client's background tasks; hand off and return
//! });
//!
//! client.connect("wss://example.test/socket");
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod protocol;
pub mod uri;

pub(crate) mod tls;

pub use client::{LifecycleState, WebSocketClient};
pub use config::{Config, Limits};
pub use error::{Error, Result};
pub use event::{Event, EventSink};
pub use message::{ABNORMAL_CLOSURE, CloseCode, CloseFrame, Message};
pub use uri::EndpointUri;
