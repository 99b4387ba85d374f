//! Minimal scripted RFC 6455 server built on the crate's own protocol
//! types. Each test dictates exactly what the server does and observes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wsline::Error;
use wsline::protocol::{Frame, OpCode, compute_accept_key};

pub struct TestServer {
    listener: TcpListener,
    uri: String,
}

impl TestServer {
    /// Bind on an ephemeral port. Returns the server and its ws:// URI.
    pub async fn bind() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        TestServer {
            listener,
            uri: format!("ws://127.0.0.1:{port}/socket"),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Accept one client and complete the upgrade handshake.
    pub async fn accept(&self) -> ServerConn<TcpStream> {
        let (stream, _) = self.listener.accept().await.unwrap();
        ServerConn::upgrade(stream).await
    }

    /// Accept one client without answering anything.
    pub async fn accept_raw(&self) -> TcpStream {
        let (stream, _) = self.listener.accept().await.unwrap();
        stream
    }
}

pub struct ServerConn<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConn<S> {
    /// Perform the server side of the upgrade on an accepted stream.
    pub async fn upgrade(mut stream: S) -> ServerConn<S> {
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            if let Some(pos) = request
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed during handshake");
            request.extend_from_slice(&chunk[..n]);
        };

        let text = std::str::from_utf8(&request[..header_end]).unwrap();
        assert!(text.starts_with("GET "), "not an upgrade request: {text}");
        let key = text
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .expect("missing Sec-WebSocket-Key");

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            compute_accept_key(&key)
        );
        stream.write_all(response.as_bytes()).await.unwrap();

        ServerConn {
            stream,
            buf: request[header_end..].to_vec(),
        }
    }

    /// Read one frame from the client (unmasked transparently).
    pub async fn read_frame(&mut self) -> Frame {
        loop {
            match Frame::parse(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    return frame;
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => panic!("bad frame from client: {e}"),
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-frame");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read the next data message, skipping control frames.
    pub async fn read_message(&mut self) -> (OpCode, Vec<u8>) {
        loop {
            let frame = self.read_frame().await;
            match frame.opcode {
                OpCode::Text | OpCode::Binary => {
                    assert!(frame.fin, "client sent a fragmented message");
                    return (frame.opcode, frame.into_payload());
                }
                OpCode::Ping | OpCode::Pong => {}
                other => panic!("unexpected {other:?} frame"),
            }
        }
    }

    /// Read frames until the client's close frame arrives.
    pub async fn expect_close(&mut self) -> (Option<u16>, String) {
        loop {
            let frame = self.read_frame().await;
            if frame.opcode == OpCode::Close {
                let payload = frame.payload();
                return if payload.len() >= 2 {
                    (
                        Some(u16::from_be_bytes([payload[0], payload[1]])),
                        String::from_utf8_lossy(&payload[2..]).into_owned(),
                    )
                } else {
                    (None, String::new())
                };
            }
        }
    }

    pub async fn send_frame(&mut self, frame: &Frame) {
        let mut buf = vec![0u8; frame.wire_size(false)];
        let written = frame.write(&mut buf, None).unwrap();
        self.stream.write_all(&buf[..written]).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) {
        self.send_frame(&Frame::binary(data.into())).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_frame(&Frame::text(text.as_bytes().to_vec())).await;
    }

    pub async fn send_ping(&mut self, data: impl Into<Vec<u8>>) {
        self.send_frame(&Frame::ping(data.into())).await;
    }

    /// Send one message split into `fragments` frames.
    pub async fn send_fragmented(&mut self, payload: &[u8], fragments: usize) {
        assert!(fragments >= 1);
        let chunk_size = payload.len().div_ceil(fragments);
        let chunks: Vec<&[u8]> = payload.chunks(chunk_size.max(1)).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let fin = i == chunks.len() - 1;
            let opcode = if i == 0 {
                OpCode::Binary
            } else {
                OpCode::Continuation
            };
            self.send_frame(&Frame::new(fin, opcode, chunk.to_vec())).await;
        }
    }

    pub async fn send_close(&mut self, code: u16, reason: &str) {
        self.send_frame(&Frame::close(Some(code), reason)).await;
    }

    /// Drop the transport without a closing handshake.
    pub fn abort(self) {
        drop(self.stream);
    }
}
