use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::state::LifecycleState;
use crate::client::{Mailbox, Transport};
use crate::codec::{FrameReader, FrameWriter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{Event, EventSink};
use crate::message::{ABNORMAL_CLOSURE, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::{Frame, OpCode, UpgradeRequest, UpgradeResponse};
use crate::uri::EndpointUri;

/// Close reasons longer than this cannot fit a control frame (RFC 6455:
/// control payload <= 125 bytes, minus the 2-byte status code).
const MAX_CLOSE_REASON: usize = 123;

/// A long-lived WebSocket client for one logical connection at a time.
///
/// All outcomes are reported through the [`EventSink`] supplied at
/// construction; no method blocks on network progress. Received messages
/// are buffered in a thread-safe mailbox drained by [`receive`].
///
/// ## Example
///
/// ```rust,ignore
/// use wsline::{Config, Event, Message, WebSocketClient};
///
/// let client = WebSocketClient::new(Config::default(), |event: Event| {
///     println!("event: {event:?}");
/// });
///
/// client.connect("wss://example.test/socket");
/// // ... after observing Event::Connected:
/// client.send(Message::binary(vec![0x01, 0x02]));
/// // ... after each Event::NextMessage:
/// while let Some(payload) = client.receive() {
///     println!("got {} bytes", payload.len());
/// }
/// client.close(1000, "done");
/// ```
///
/// [`receive`]: WebSocketClient::receive
pub struct WebSocketClient {
    shared: Arc<Shared>,
}

struct Shared {
    config: Config,
    sink: Arc<dyn EventSink>,
    mailbox: Mailbox,
    conn: Mutex<Conn>,
    /// Serializes connect attempts so a reconnect fully supersedes the
    /// previous connection before the new handshake begins.
    connect_serial: tokio::sync::Mutex<()>,
}

/// Per-connection handles, all behind one lock that is never held across
/// an await point.
#[derive(Default)]
struct Conn {
    state: LifecycleState,
    cancel: Option<watch::Sender<bool>>,
    outbound: Option<mpsc::UnboundedSender<Command>>,
    gate: Option<Arc<DisconnectGate>>,
    supervisor: Option<JoinHandle<()>>,
}

/// Work items consumed by the single writer activity. Enqueue order is
/// wire order.
enum Command {
    Send(Message),
    Pong(Vec<u8>),
    CloseEcho(Option<u16>),
    Close { code: u16, reason: String },
}

/// Why the read activity stopped.
enum ReadEnd {
    PeerClose { code: u16, reason: String },
    Failed(Error),
    Cancelled,
}

/// Why the write activity stopped.
enum WriteEnd {
    LocalClose,
    Failed(Error),
    Drained,
    Cancelled,
}

/// Guards the terminal disconnect notification.
///
/// Several independent failure sources race to report termination: the
/// read activity, the write activity, an explicit close, and a reconnect
/// superseding the connection. The first claim wins; everyone else is
/// silently absorbed. The event itself fires outside the lock so a sink
/// may call back into the client.
struct DisconnectGate {
    sink: Arc<dyn EventSink>,
    dispatched: Mutex<bool>,
}

impl DisconnectGate {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            dispatched: Mutex::new(false),
        }
    }

    /// Emit `Disconnected(code, reason)` if nothing was dispatched yet.
    fn dispatch(&self, code: u16, reason: &str) {
        {
            let mut dispatched = lock(&self.dispatched);
            if *dispatched {
                debug!(code, reason, "disconnect already dispatched, suppressing");
                return;
            }
            *dispatched = true;
        }
        debug!(code, reason, "dispatching disconnect");
        self.sink.dispatch(Event::Disconnected {
            code,
            reason: reason.to_string(),
        });
    }

    /// Claim the dispatch without emitting anything.
    fn suppress(&self) {
        *lock(&self.dispatched) = true;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WebSocketClient {
    /// Create a client. Events for every subsequent connection go to `sink`.
    pub fn new(config: Config, sink: impl EventSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                sink: Arc::new(sink),
                mailbox: Mailbox::new(),
                conn: Mutex::new(Conn::default()),
                connect_serial: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Begin establishing a connection to `uri`.
    ///
    /// Returns immediately; the outcome arrives as `Connected` or `Error`.
    /// If a connection is already active or pending it is torn down first,
    /// with its disconnect reported as an abnormal closure.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(&self, uri: impl Into<String>) {
        let uri = uri.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut conn = lock(&self.shared.conn);
            if !conn.state.is_active() {
                // Make the attempt observable right away so close() before
                // the spawned task runs still cancels it.
                conn.state = LifecycleState::Connecting;
                conn.cancel = Some(cancel_tx.clone());
            }
        }

        let shared = self.shared.clone();
        tokio::spawn(run_connect(shared, uri, cancel_tx, cancel_rx));
    }

    /// Enqueue a message for transmission.
    ///
    /// Silently ignored unless the connection is open; callers are expected
    /// to track state via the `Connected` event, not via send results.
    pub fn send(&self, message: Message) {
        let conn = lock(&self.shared.conn);
        if !conn.state.can_send() {
            debug!(state = %conn.state, "send ignored, connection not open");
            return;
        }
        if let Some(outbound) = &conn.outbound {
            let _ = outbound.send(Command::Send(message));
        }
    }

    /// Enqueue a text message. See [`send`](Self::send).
    pub fn send_text(&self, text: impl Into<String>) {
        self.send(Message::Text(text.into()));
    }

    /// Enqueue a binary message. See [`send`](Self::send).
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        self.send(Message::Binary(data.into()));
    }

    /// Pop one received message, or `None` if the mailbox is empty.
    /// Never blocks. Drain promptly after `NextMessage` pokes, or the
    /// mailbox grows with arrival rate.
    pub fn receive(&self) -> Option<Vec<u8>> {
        self.shared.mailbox.pop()
    }

    /// Request a graceful shutdown with the given close code.
    ///
    /// On an open connection this triggers the single disconnect dispatch
    /// with `(code, reason)` and sends a close frame after all pending
    /// writes. Before the connection opens it cancels the attempt and moves
    /// straight to `Closed` without emitting anything. Idempotent.
    pub fn close(&self, code: u16, reason: &str) {
        let (gate, outbound) = {
            let mut conn = lock(&self.shared.conn);
            match conn.state {
                LifecycleState::Idle => {
                    conn.state = LifecycleState::Closed;
                    return;
                }
                LifecycleState::Connecting => {
                    if let Some(cancel) = conn.cancel.take() {
                        let _ = cancel.send(true);
                    }
                    conn.state = LifecycleState::Closed;
                    return;
                }
                LifecycleState::Open => {
                    conn.state = LifecycleState::Closing;
                    (conn.gate.clone(), conn.outbound.clone())
                }
                LifecycleState::Closing | LifecycleState::Closed => return,
            }
        };

        debug!(code, reason, "close requested");
        if let Some(gate) = gate {
            gate.dispatch(code, reason);
        }
        if let Some(outbound) = outbound {
            let _ = outbound.send(Command::Close {
                code,
                reason: truncate_close_reason(reason).to_string(),
            });
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        lock(&self.shared.conn).state
    }

    /// Whether the connection is open for sending.
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        let mut conn = lock(&self.shared.conn);
        if let Some(gate) = conn.gate.take() {
            gate.suppress();
        }
        if let Some(cancel) = conn.cancel.take() {
            let _ = cancel.send(true);
        }
        conn.outbound = None;
        conn.state = LifecycleState::Closed;
    }
}

fn truncate_close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

fn parse_close_payload(payload: &[u8]) -> (Option<u16>, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (Some(code), reason)
    } else {
        (None, String::new())
    }
}

/// The connect chain: supersede any prior connection, then resolve,
/// connect, wrap in TLS, upgrade, and start the connection activities.
async fn run_connect(
    shared: Arc<Shared>,
    uri: String,
    cancel_tx: watch::Sender<bool>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let _serial = shared.connect_serial.lock().await;

    // Tear down whatever connection this attempt supersedes, reporting its
    // end as an abnormal closure, and wait for its activities to stop.
    let prior = {
        let mut conn = lock(&shared.conn);
        match conn.supervisor.take() {
            Some(supervisor) => {
                conn.outbound = None;
                Some((conn.gate.take(), conn.cancel.take(), supervisor))
            }
            None => None,
        }
    };
    if let Some((gate, cancel, supervisor)) = prior {
        debug!("superseding previous connection");
        if let Some(gate) = gate {
            gate.dispatch(ABNORMAL_CLOSURE, "superseded by new connection");
        }
        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
        }
        let _ = supervisor.await;
    }

    {
        let mut conn = lock(&shared.conn);
        if *cancel_rx.borrow() {
            conn.state = LifecycleState::Closed;
            conn.cancel = None;
            return;
        }
        conn.state = LifecycleState::Connecting;
        conn.cancel = Some(cancel_tx.clone());
    }

    let endpoint = match EndpointUri::parse(&uri) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            fail_connect(&shared, &e);
            return;
        }
    };
    debug!(endpoint = %endpoint, "connecting");

    let connect_timeout = shared.config.connect_timeout;
    let established = tokio::select! {
        _ = cancel_rx.changed() => None,
        result = tokio::time::timeout(connect_timeout, establish(&shared.config, &endpoint)) => {
            Some(result.unwrap_or(Err(Error::ConnectTimeout(connect_timeout))))
        }
    };

    let (transport, leftover) = match established {
        None => {
            debug!("connect attempt cancelled");
            let mut conn = lock(&shared.conn);
            conn.state = LifecycleState::Closed;
            conn.cancel = None;
            return;
        }
        Some(Err(e)) => {
            fail_connect(&shared, &e);
            return;
        }
        Some(Ok(parts)) => parts,
    };

    let (read_half, write_half) = tokio::io::split(transport);
    let reader = FrameReader::with_leftover(
        read_half,
        shared.config.limits.clone(),
        shared.config.read_buffer_size,
        &leftover,
    );
    let writer = FrameWriter::new(write_half, shared.config.write_buffer_size);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(DisconnectGate::new(shared.sink.clone()));

    {
        let mut conn = lock(&shared.conn);
        if *cancel_rx.borrow() {
            // close() landed during the handshake; never open.
            conn.state = LifecycleState::Closed;
            conn.cancel = None;
            return;
        }
        conn.state = LifecycleState::Open;
        conn.outbound = Some(outbound_tx.clone());
        conn.gate = Some(gate.clone());
        conn.cancel = Some(cancel_tx.clone());
    }

    debug!(endpoint = %endpoint, "connection open");
    // Connected is dispatched before the read activity starts, so it always
    // precedes the first NextMessage.
    shared.sink.dispatch(Event::Connected);

    let read_task = tokio::spawn(read_loop(
        reader,
        shared.clone(),
        outbound_tx,
        cancel_rx.clone(),
    ));
    let write_task = tokio::spawn(write_loop(writer, outbound_rx, cancel_rx));
    let supervisor = tokio::spawn(supervise(
        shared.clone(),
        gate,
        cancel_tx,
        read_task,
        write_task,
    ));

    lock(&shared.conn).supervisor = Some(supervisor);
}

fn fail_connect(shared: &Arc<Shared>, error: &Error) {
    warn!(%error, "connection attempt failed");
    {
        let mut conn = lock(&shared.conn);
        conn.state = LifecycleState::Closed;
        conn.cancel = None;
    }
    shared.sink.dispatch(Event::Error {
        message: error.to_string(),
    });
}

/// Resolve, connect, TLS-wrap and upgrade. Returns the open transport plus
/// any bytes the server sent bundled after the `101` response.
async fn establish(config: &Config, endpoint: &EndpointUri) -> Result<(Transport, Vec<u8>)> {
    let addrs: Vec<std::net::SocketAddr> =
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| Error::Resolve(format!("{}: {e}", endpoint.host)))?
            .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve(endpoint.host.clone()));
    }
    debug!(host = %endpoint.host, count = addrs.len(), "resolved");

    let mut stream = None;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(s) => {
                debug!(%addr, "transport connected");
                stream = Some(s);
                break;
            }
            Err(e) => {
                debug!(%addr, error = %e, "address unreachable");
                last_error = Some(Error::Io(e.to_string()));
            }
        }
    }
    let stream = match stream {
        Some(stream) => stream,
        None => {
            return Err(last_error.unwrap_or_else(|| Error::Resolve(endpoint.host.clone())));
        }
    };

    let mut transport = if endpoint.secure {
        let transport = crate::tls::connect(config, &endpoint.host, stream).await?;
        debug!("TLS handshake complete");
        transport
    } else {
        Transport::Plain(stream)
    };

    let request = UpgradeRequest::new(
        endpoint.host_header(),
        endpoint.path.clone(),
        config.user_agent.clone(),
    )?;
    transport.write_all(&request.to_bytes()).await?;
    transport.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        config.limits.check_handshake_size(buf.len())?;
        let n = transport.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during upgrade".into(),
            ));
        }
    };

    let response = UpgradeResponse::parse(&buf[..header_end])?;
    response.verify(&request.key)?;
    debug!("websocket handshake complete");

    Ok((transport, buf[header_end..].to_vec()))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Pull frames, reassemble messages into the mailbox, and answer control
/// frames, until the peer closes, the transport faults, or teardown asks
/// us to stop.
async fn read_loop(
    mut reader: FrameReader<ReadHalf<Transport>>,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Command>,
    mut cancel: watch::Receiver<bool>,
) -> ReadEnd {
    let mut assembler = MessageAssembler::new(shared.config.limits.clone());

    loop {
        let frame = tokio::select! {
            _ = cancel.changed() => return ReadEnd::Cancelled,
            result = reader.read_frame() => match result {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "read loop ending");
                    return ReadEnd::Failed(e);
                }
            },
        };

        match frame.opcode {
            OpCode::Ping => {
                let _ = outbound.send(Command::Pong(frame.into_payload()));
            }
            OpCode::Pong => {}
            OpCode::Close => {
                let (code, reason) = parse_close_payload(frame.payload());
                debug!(?code, reason, "peer close");
                let _ = outbound.send(Command::CloseEcho(code));
                return ReadEnd::PeerClose {
                    // 1005: peer supplied no status code (RFC 6455 7.1.5)
                    code: code.unwrap_or(1005),
                    reason,
                };
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match assembler.push(frame) {
                    Ok(Some(message)) => {
                        shared.mailbox.push(message.payload);
                        debug!(pending = shared.mailbox.len(), "message ready");
                        shared.sink.dispatch(Event::NextMessage);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, "read loop ending");
                        return ReadEnd::Failed(e);
                    }
                }
            }
        }
    }
}

/// Drain the outbound queue onto the transport, one frame write in flight
/// at a time, in enqueue order.
async fn write_loop(
    mut writer: FrameWriter<WriteHalf<Transport>>,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    mut cancel: watch::Receiver<bool>,
) -> WriteEnd {
    loop {
        let command = tokio::select! {
            _ = cancel.changed() => {
                // Commands enqueued before the cancellation (typically the
                // close-frame echo) still go out; only then unwind.
                while let Ok(command) = outbound.try_recv() {
                    if let Some(end) = run_command(&mut writer, command).await {
                        return end;
                    }
                }
                return WriteEnd::Cancelled;
            }
            command = outbound.recv() => match command {
                Some(command) => command,
                None => return WriteEnd::Drained,
            },
        };

        if let Some(end) = run_command(&mut writer, command).await {
            return end;
        }
    }
}

/// Execute one queued command. `Some(end)` terminates the write activity.
async fn run_command(
    writer: &mut FrameWriter<WriteHalf<Transport>>,
    command: Command,
) -> Option<WriteEnd> {
    match command {
        Command::Send(message) => {
            let frame = Frame::from(message);
            if let Err(e) = write_and_flush(writer, &frame).await {
                debug!(error = %e, "write loop ending");
                return Some(WriteEnd::Failed(e));
            }
        }
        Command::Pong(data) => {
            if let Err(e) = write_and_flush(writer, &Frame::pong(data)).await {
                debug!(error = %e, "write loop ending");
                return Some(WriteEnd::Failed(e));
            }
        }
        Command::CloseEcho(code) => {
            // Completes the closing handshake; the connection is ending
            // either way, so a failure here is not reported.
            let frame = Frame::close(code, "");
            if write_and_flush(writer, &frame).await.is_err() {
                return Some(WriteEnd::Cancelled);
            }
        }
        Command::Close { code, reason } => {
            let frame = Frame::close(Some(code), &reason);
            let _ = write_and_flush(writer, &frame).await;
            let _ = writer.shutdown().await;
            return Some(WriteEnd::LocalClose);
        }
    }
    None
}

async fn write_and_flush(
    writer: &mut FrameWriter<WriteHalf<Transport>>,
    frame: &Frame,
) -> Result<()> {
    writer.write_frame(frame).await?;
    writer.flush().await
}

/// Owns both activity handles. The first one to finish decides the
/// connection outcome; the other is cancelled and joined before the state
/// becomes Closed, so no activity outlives teardown.
async fn supervise(
    shared: Arc<Shared>,
    gate: Arc<DisconnectGate>,
    cancel: watch::Sender<bool>,
    mut read_task: JoinHandle<ReadEnd>,
    mut write_task: JoinHandle<WriteEnd>,
) {
    enum First {
        Read(ReadEnd),
        Write(WriteEnd),
    }

    let first = tokio::select! {
        read_end = &mut read_task => First::Read(read_end.unwrap_or_else(|e| {
            ReadEnd::Failed(Error::Io(format!("read activity failed: {e}")))
        })),
        write_end = &mut write_task => First::Write(write_end.unwrap_or_else(|e| {
            WriteEnd::Failed(Error::Io(format!("write activity failed: {e}")))
        })),
    };

    {
        let mut conn = lock(&shared.conn);
        if conn
            .gate
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &gate))
            && conn.state == LifecycleState::Open
        {
            conn.state = LifecycleState::Closing;
        }
    }

    let _ = cancel.send(true);
    match &first {
        First::Read(_) => {
            let _ = write_task.await;
        }
        First::Write(_) => {
            let _ = read_task.await;
        }
    }

    match first {
        First::Read(ReadEnd::PeerClose { code, reason }) => gate.dispatch(code, &reason),
        First::Read(ReadEnd::Failed(e)) => gate.dispatch(ABNORMAL_CLOSURE, &e.to_string()),
        First::Write(WriteEnd::Failed(e)) => gate.dispatch(ABNORMAL_CLOSURE, &e.to_string()),
        // Local close and cancellation claim the gate at the trigger site.
        First::Read(ReadEnd::Cancelled)
        | First::Write(WriteEnd::LocalClose | WriteEnd::Drained | WriteEnd::Cancelled) => {}
    }

    shared.mailbox.clear();
    {
        let mut conn = lock(&shared.conn);
        if conn
            .gate
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &gate))
        {
            conn.outbound = None;
            conn.cancel = None;
            conn.gate = None;
            conn.supervisor = None;
            conn.state = LifecycleState::Closed;
        }
    }
    debug!("teardown complete");
}
