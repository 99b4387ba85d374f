//! Lifecycle events pushed to the embedding caller.
//!
//! The client reports everything through a caller-supplied [`EventSink`];
//! no method call returns connection outcomes. `NextMessage` carries no
//! payload on purpose: it is a poke to call
//! [`WebSocketClient::receive`](crate::WebSocketClient::receive), which lets
//! the caller batch-drain the mailbox.

/// Events emitted over the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Handshakes completed; the connection is open.
    Connected,
    /// A complete message was appended to the inbound mailbox.
    NextMessage,
    /// The connection ended. Emitted at most once per connection.
    Disconnected {
        /// Close code: the peer's code on a clean close, 1006 otherwise.
        code: u16,
        /// Reason text from the peer or a description of the failure.
        reason: String,
    },
    /// Establishment failed before the connection ever opened.
    Error {
        /// Human-readable cause.
        message: String,
    },
}

impl Event {
    /// Returns `true` for the terminal `Disconnected` event.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Event::Disconnected { .. })
    }
}

/// Destination for client events.
///
/// Dispatch is called from the client's background tasks; implementations
/// must be cheap and must not block. Hand the event off to your own queue
/// and return.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event.
    fn dispatch(&self, event: Event);
}

impl<F> EventSink for F
where
    F: Fn(Event) + Send + Sync + 'static,
{
    fn dispatch(&self, event: Event) {
        self(event);
    }
}
