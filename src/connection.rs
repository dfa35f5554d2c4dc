//! Connection state machine: owns the upgraded stream, buffers partial
//! reads, dispatches decoded frames as [`Event`]s and runs the close
//! handshake and keepalive.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant, Interval};
use tracing::{debug, trace};

use crate::codec::FrameCodec;
use crate::errors::{Error, HandshakeError};
use crate::frame::{CloseCode, Frame, Opcode};
use crate::handshake;
use crate::http::Record;
use crate::message::Message;
use crate::{CLIENT, SERVER};

/// Tuning for a connection, consumed by the `accept`/`connect` factories.
#[derive(Debug, Clone)]
pub struct Config {
    /// Send periodic keepalive pings. Effective on client connections.
    pub keepalive: bool,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Inbound frames declaring a larger payload are refused before the
    /// body is buffered.
    pub max_payload_len: usize,
    /// Peer address for diagnostics; shows up in log events.
    pub peer_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keepalive: true,
            keepalive_interval: Duration::from_millis(5000),
            max_payload_len: 16 * 1024 * 1024,
            peer_addr: None,
        }
    }
}

/// Everything a connection can be observed doing.
///
/// [`Connection::next_event`] yields these in wire order and returns `None`
/// forever once [`Event::End`] has been delivered.
#[derive(Debug)]
pub enum Event {
    /// A TEXT frame, decoded as UTF-8.
    Text(String),
    /// A BINARY frame.
    Binary(Vec<u8>),
    /// A PING arrived; the answering PONG is already on the wire.
    Ping(Vec<u8>),
    /// A PONG arrived, solicited or not.
    Pong(Vec<u8>),
    /// The peer vanished without a CLOSE frame. At most once, strictly
    /// before [`Event::End`].
    ConnectionReset,
    /// A fatal fault that was not a peer hangup. Followed by [`Event::End`].
    Error(Error),
    /// Terminal event, exactly once per connection. Carries the close code
    /// symbol and reason observed from the peer, when there was one.
    End {
        /// Symbolic close code; `None` when the peer sent none or sent a
        /// code outside the table (the numeric value stays available via
        /// [`Connection::close_code`]).
        code: Option<CloseCode>,
        /// UTF-8 close reason, when present.
        reason: Option<String>,
    },
}

enum Filled {
    Bytes,
    Eof,
    PingDue,
    Failed(io::Error),
}

/// One WebSocket connection over an already-upgraded byte stream.
///
/// The const parameter picks the role: [`SERVER`](crate::SERVER)
/// connections require masked input and send unmasked, [`CLIENT`](crate::CLIENT)
/// connections the reverse.
#[derive(Debug)]
pub struct Connection<const SIDE: bool, IO> {
    stream: IO,
    codec: FrameCodec<SIDE>,
    buf: BytesMut,
    pending: VecDeque<Event>,
    protocol: Option<String>,
    peer: Option<String>,
    keepalive_every: Option<Duration>,
    keepalive: Option<Interval>,
    close_written: bool,
    close_received: bool,
    end_emitted: bool,
    close_code: Option<u16>,
    close_reason: Option<String>,
    frames_received: u64,
    frames_sent: u64,
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Connection<SERVER, IO> {
    /// Accepts a validated Upgrade request: negotiates the subprotocol,
    /// writes the `101` response and takes ownership of the stream.
    ///
    /// `residual` is whatever the host's HTTP parser over-read past the
    /// request head; it is pushed to the front of the receive buffer so no
    /// early frame is lost.
    pub async fn accept(
        req: &Record<'_>,
        stream: IO,
        residual: &[u8],
        supported: Option<&[&str]>,
    ) -> Result<Self, HandshakeError> {
        Self::accept_with(req, stream, residual, supported, Config::default()).await
    }

    /// [`accept`](Self::accept) with explicit [`Config`].
    pub async fn accept_with(
        req: &Record<'_>,
        mut stream: IO,
        residual: &[u8],
        supported: Option<&[&str]>,
        config: Config,
    ) -> Result<Self, HandshakeError> {
        let (key, protocol) = handshake::check_request(req, supported)?;
        stream
            .write_all(handshake::response(key, protocol.as_deref()).as_bytes())
            .await?;
        debug!(
            peer = config.peer_addr.as_deref(),
            protocol = protocol.as_deref(),
            "accepted websocket upgrade"
        );
        Ok(Self::new(stream, residual, protocol, config))
    }

    /// Validates the request and writes the `101` response, then hands the
    /// raw stream back untouched: no connection is built and nothing reads
    /// from the stream. For proxy pass-through.
    pub async fn accept_detached(
        req: &Record<'_>,
        mut stream: IO,
        supported: Option<&[&str]>,
    ) -> Result<IO, HandshakeError> {
        let (key, protocol) = handshake::check_request(req, supported)?;
        stream
            .write_all(handshake::response(key, protocol.as_deref()).as_bytes())
            .await?;
        Ok(stream)
    }
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Connection<CLIENT, IO> {
    /// Validates the server's Upgrade response against the key this client
    /// sent (see [`handshake::generate_key`]) and takes ownership of the
    /// stream. `residual` is anything read past the response head.
    pub fn connect(
        res: &Record<'_>,
        stream: IO,
        residual: &[u8],
        key: &str,
    ) -> Result<Self, HandshakeError> {
        Self::connect_with(res, stream, residual, key, Config::default())
    }

    /// [`connect`](Self::connect) with explicit [`Config`].
    pub fn connect_with(
        res: &Record<'_>,
        stream: IO,
        residual: &[u8],
        key: &str,
        config: Config,
    ) -> Result<Self, HandshakeError> {
        let protocol = handshake::check_response(res, key)?;
        debug!(
            peer = config.peer_addr.as_deref(),
            protocol = protocol.as_deref(),
            "websocket upgrade confirmed"
        );
        Ok(Self::new(stream, residual, protocol, config))
    }

    /// Validates the response and hands the raw stream back untouched.
    pub fn connect_detached(
        res: &Record<'_>,
        stream: IO,
        key: &str,
    ) -> Result<IO, HandshakeError> {
        handshake::check_response(res, key)?;
        Ok(stream)
    }
}

impl<const SIDE: bool, IO> Connection<SIDE, IO> {
    fn new(stream: IO, residual: &[u8], protocol: Option<String>, config: Config) -> Self {
        let mut buf = BytesMut::with_capacity(residual.len().max(4 * 1024));
        buf.extend_from_slice(residual);
        // Outbound pings are a client concern: the server relies on the
        // client's pings to learn the link is alive.
        let keepalive_every =
            (CLIENT == SIDE && config.keepalive).then_some(config.keepalive_interval);
        Self {
            stream,
            codec: FrameCodec::new(config.max_payload_len),
            buf,
            pending: VecDeque::new(),
            protocol,
            peer: config.peer_addr,
            keepalive_every,
            keepalive: None,
            close_written: false,
            close_received: false,
            end_emitted: false,
            close_code: None,
            close_reason: None,
            frames_received: 0,
            frames_sent: 0,
        }
    }

    /// Subprotocol agreed during the handshake.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Peer address supplied via [`Config::peer_addr`].
    pub fn peer_addr(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Numeric close code received from the peer, table-listed or not.
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Close reason received from the peer.
    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }

    /// Frames decoded so far.
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Frames written so far, keepalive and close frames included.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

impl<const SIDE: bool, IO: AsyncRead + AsyncWrite + Unpin> Connection<SIDE, IO> {
    /// Waits for the next observable event.
    ///
    /// Bytes are pumped from the transport only while this is being
    /// awaited, so nothing is decoded before the caller is ready to
    /// observe events. Returns `None` forever after [`Event::End`].
    pub async fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.end_emitted {
            return None;
        }

        loop {
            match self.codec.decode(&mut self.buf) {
                Err(err) => return Some(self.fault(err).await),
                Ok(Some(frame)) => {
                    self.frames_received += 1;
                    match self.dispatch(frame).await {
                        Ok(Some(event)) => return Some(event),
                        Ok(None) => continue,
                        Err(err) => return Some(self.fault(err).await),
                    }
                }
                Ok(None) => {}
            }

            match self.fill().await {
                Filled::Bytes => {}
                Filled::Eof => return Some(self.hangup()),
                Filled::PingDue => {
                    trace!("keepalive ping");
                    if let Err(err) = self.write_frame(Opcode::Ping, &[]).await {
                        return Some(self.fault(err).await);
                    }
                }
                Filled::Failed(err) => return Some(self.fault(Error::Transport(err)).await),
            }
        }
    }

    /// Sends one data frame: TEXT for text payloads, BINARY for bytes.
    pub async fn send(&mut self, msg: impl Message) -> Result<(), Error> {
        self.write_frame(msg.opcode(), msg.payload()).await
    }

    /// Sends a PING with the given payload.
    pub async fn send_ping(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.write_frame(Opcode::Ping, payload).await
    }

    /// Sends an unsolicited PONG, a legal unidirectional heartbeat.
    pub async fn send_pong(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.write_frame(Opcode::Pong, payload).await
    }

    /// Starts (or reciprocates) the close handshake: sends a CLOSE frame
    /// with code 1000 and the optional reason. At most one CLOSE is ever
    /// written; later calls are no-ops. The connection keeps delivering
    /// events until the peer hangs up.
    pub async fn end(&mut self, reason: Option<&str>) -> Result<(), Error> {
        if self.close_written {
            return Ok(());
        }
        if reason.map_or(0, str::len) > 123 {
            return Err(Error::Application("close reason limited to 123 bytes"));
        }
        self.close_written = true;

        let reason_bytes = reason.map_or(&b""[..], str::as_bytes);
        let mut payload = Vec::with_capacity(2 + reason_bytes.len());
        payload.extend_from_slice(&u16::from(CloseCode::Normal).to_be_bytes());
        payload.extend_from_slice(reason_bytes);
        debug!(reason, "sending close frame");
        self.write_frame(Opcode::Close, &payload).await
    }

    /// Unclean teardown: force-closes and releases the stream without a
    /// CLOSE frame, handing back the terminal event — or `None` when
    /// [`Event::End`] was already delivered, so it is never observed twice.
    /// Consumes the connection; nothing can follow.
    pub async fn destroy(mut self) -> Option<Event> {
        debug!(peer = self.peer.as_deref(), "destroying connection");
        let _ = self.stream.shutdown().await;
        (!self.end_emitted).then(|| self.terminal())
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Option<Event>, Error> {
        if !frame.fin || frame.opcode == Opcode::Continue {
            // Continuation reassembly is a non-goal; wind down politely
            // instead of failing the connection.
            debug!("fragmented message received, closing");
            self.end(None).await?;
            return Ok(None);
        }
        match frame.opcode {
            Opcode::Text => Ok(Some(Event::Text(
                String::from_utf8_lossy(&frame.payload).into_owned(),
            ))),
            Opcode::Binary => Ok(Some(Event::Binary(frame.payload))),
            Opcode::Ping => {
                self.write_frame(Opcode::Pong, &frame.payload).await?;
                Ok(Some(Event::Ping(frame.payload)))
            }
            Opcode::Pong => Ok(Some(Event::Pong(frame.payload))),
            Opcode::Close => {
                self.close_received = true;
                let (code, reason) = frame.close_params();
                self.close_code = code;
                self.close_reason = reason;
                debug!(code, reason = self.close_reason.as_deref(), "close frame received");
                self.end(None).await?;
                self.stream.shutdown().await?;
                Ok(None)
            }
            Opcode::Continue => Ok(None),
        }
    }

    async fn fill(&mut self) -> Filled {
        if self.keepalive.is_none() {
            if let Some(every) = self.keepalive_every {
                self.keepalive = Some(time::interval_at(Instant::now() + every, every));
            }
        }
        let read = match self.keepalive.as_mut() {
            Some(timer) => tokio::select! {
                biased;
                _ = timer.tick() => return Filled::PingDue,
                read = self.stream.read_buf(&mut self.buf) => read,
            },
            None => self.stream.read_buf(&mut self.buf).await,
        };
        match read {
            Ok(0) => Filled::Eof,
            Ok(_) => Filled::Bytes,
            Err(err) => Filled::Failed(err),
        }
    }

    async fn write_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Error> {
        let mut dst = BytesMut::with_capacity(14 + payload.len());
        self.codec.encode(opcode, payload, &mut dst)?;
        self.stream.write_all(&dst).await?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Terminal transition; returns the `End` event exactly once.
    fn terminal(&mut self) -> Event {
        self.end_emitted = true;
        self.keepalive = None;
        self.keepalive_every = None;
        Event::End {
            code: self.close_code.and_then(CloseCode::from_u16),
            reason: self.close_reason.clone(),
        }
    }

    /// Transport EOF, or an error that means the peer went away.
    fn hangup(&mut self) -> Event {
        if self.close_received {
            debug!("transport closed after close handshake");
            self.terminal()
        } else {
            debug!(peer = self.peer.as_deref(), "peer vanished without a close frame");
            let end = self.terminal();
            self.pending.push_back(end);
            Event::ConnectionReset
        }
    }

    async fn fault(&mut self, err: Error) -> Event {
        if err.is_reset() {
            return self.hangup();
        }
        debug!(error = %err, "fatal connection error");
        let _ = self.stream.shutdown().await;
        let end = self.terminal();
        self.pending.push_back(end);
        Event::Error(err)
    }
}
