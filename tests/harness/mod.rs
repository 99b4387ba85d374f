//! Test harness for driving the client against a scripted in-process
//! WebSocket server.

// Each integration suite compiles its own copy and uses a different subset.
#![allow(dead_code)]

mod server;

pub use server::{ServerConn, TestServer};

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use wsline::{Config, Event, WebSocketClient};

/// Build a client whose events are captured on a channel.
pub fn recording_client(config: Config) -> (WebSocketClient, UnboundedReceiver<Event>) {
    let (tx, rx) = unbounded_channel();
    let client = WebSocketClient::new(config, move |event: Event| {
        let _ = tx.send(event);
    });
    (client, rx)
}

/// Next event, or panic after two seconds.
pub async fn next_event(rx: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert the next event is `Connected`.
pub async fn expect_connected(rx: &mut UnboundedReceiver<Event>) {
    let event = next_event(rx).await;
    assert_eq!(event, Event::Connected, "expected Connected, got {event:?}");
}

/// Drain events for a settling window and return them.
pub async fn drain_events(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) | Err(_) => break,
        }
    }
    events
}
