//! The WebSocket client: one logical connection, concurrent read/write
//! activities over a shared transport, and exactly-once teardown.
//!
//! ## Lifecycle
//!
//! 1. **Idle**: constructed, never connected
//! 2. **Connecting**: resolve, connect, TLS and upgrade as one cancellable
//!    chain under the connect timeout
//! 3. **Open**: reader, writer and supervisor tasks running
//! 4. **Closing**: teardown triggered by close, read error, write error
//!    or peer close; activities are joined, not detached
//! 5. **Closed**: terminal; the instance may `connect` again
//!
//! Whatever ends the connection, the caller sees exactly one
//! `Disconnected` event.

mod mailbox;
mod state;
mod transport;

#[allow(clippy::module_inception)]
mod client;

pub use client::WebSocketClient;
pub use state::LifecycleState;

pub(crate) use mailbox::Mailbox;
pub(crate) use transport::Transport;
