//! Failure classification.
//!
//! Handshake rejections surface synchronously from the `accept`/`connect`
//! factories. Everything else is asynchronous: transport faults and protocol
//! violations become [`Event`](crate::Event)s that drive the connection to
//! its terminal state, with peer-vanished conditions (reset, broken pipe,
//! write after end) classified apart from genuine errors.

use std::io;

use thiserror::Error;

/// Why an Upgrade request or response was rejected.
///
/// The caller keeps ownership of the stream and is expected to close it,
/// after writing [`handshake::bad_request`](crate::handshake::bad_request)
/// if it wishes.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// `Upgrade` header absent or not equal to `websocket`.
    #[error("missing or invalid `Upgrade: websocket` header")]
    MissingUpgrade,
    /// Request carries no `Sec-WebSocket-Key`.
    #[error("missing `Sec-WebSocket-Key` header")]
    MissingKey,
    /// `Sec-WebSocket-Version` present but not `13`.
    #[error("unsupported websocket version, expected 13")]
    BadVersion,
    /// The peer offered subprotocols, none of which are supported.
    #[error("no offered subprotocol is supported")]
    NoMatchingSubprotocol,
    /// The peer offered subprotocols but the server supports none at all.
    #[error("peer requested a subprotocol negotiation")]
    UnexpectedSubprotocolRequest,
    /// Response status line is not `101`.
    #[error("expected `101 Switching Protocols` status")]
    BadStatus,
    /// `Connection` header absent or not equal to `upgrade`.
    #[error("missing or invalid `Connection: Upgrade` header")]
    MissingConnection,
    /// `Sec-WebSocket-Accept` absent or not derived from the sent nonce.
    #[error("`Sec-WebSocket-Accept` does not match the sent key")]
    BadAccept,
    /// Writing the `101` response failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A fault on an established connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer broke a framing rule: wrong masking for its role, an
    /// unknown opcode, or an impossible length encoding.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// The receive buffer opens with ASCII `HT`: an upstream HTTP parser
    /// leaked header bytes into the framed stream.
    #[error("stream carries HTTP bytes instead of websocket frames")]
    StreamMisdirection,
    /// Declared payload length beyond 2^32-1 or over the configured cap.
    #[error("frame payload of {0} bytes exceeds the permitted maximum")]
    TooBig(u64),
    /// Invalid use of the sending API, reported synchronously to the caller.
    #[error("{0}")]
    Application(&'static str),
    /// Transport fault that is not a peer-vanished condition.
    #[error(transparent)]
    Transport(#[from] io::Error),
}

impl Error {
    /// Peer-closed-underneath-us conditions behave like EOF: they yield
    /// `connectionReset` + `end` rather than an `error` event.
    pub(crate) fn is_reset(&self) -> bool {
        matches!(
            self,
            Error::Transport(e) if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            )
        )
    }
}
