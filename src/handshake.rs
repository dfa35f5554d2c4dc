//! Stateless helpers for the HTTP/1.1 Upgrade handshake.
//!
//! The actual HTTP exchange is the host's business; these functions
//! validate an already-parsed head ([`http::Record`](crate::http::Record)),
//! derive the accept key, negotiate a subprotocol and build the byte-exact
//! request/response heads.

use sha1::{Digest, Sha1};

use crate::errors::HandshakeError;
use crate::http::Record;

/// GUID appended to the client nonce before hashing, per RFC 6455 §4.2.2.
pub const MAGIC_STRING: &[u8; 36] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Fresh `Sec-WebSocket-Key` value: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
    base64::encode(rand::random::<[u8; 16]>())
}

/// `Sec-WebSocket-Accept` value derived from the peer's key.
///
/// ```rust
/// assert_eq!(
///     ws_driver::handshake::accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn accept_key(key: &[u8]) -> String {
    let mut m = Sha1::new();
    m.update(key);
    m.update(MAGIC_STRING);
    base64::encode(m.finalize())
}

/// The `101 Switching Protocols` head answering `key`, terminated by the
/// blank line. Framed traffic may follow immediately after.
pub fn response(key: &[u8], protocol: Option<&str>) -> String {
    let accept = accept_key(key);
    let protocol = protocol
        .map(|p| format!("Sec-WebSocket-Protocol: {p}\r\n"))
        .unwrap_or_default();
    format!("HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n{protocol}\r\n")
}

/// Upgrade-request head a client writes before handing the stream and the
/// response to [`Connection::connect`](crate::Connection::connect).
pub fn request<'a>(
    host: &str,
    path: &str,
    key: &str,
    protocols: &[&str],
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let path = path.trim_start_matches('/');
    let protocols = match protocols {
        [] => String::new(),
        list => format!("Sec-WebSocket-Protocol: {}\r\n", list.join(", ")),
    };
    let headers: String = headers
        .into_iter()
        .map(|(name, value)| format!("{name}: {value}\r\n"))
        .collect();

    format!("GET /{path} HTTP/1.1\r\nHost: {host}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {key}\r\n{protocols}{headers}\r\n")
}

/// Conventional reply for a rejected upgrade; the caller writes it and
/// closes the stream.
pub fn bad_request() -> &'static str {
    "HTTP/1.1 400 Bad Request\r\n\r\n"
}

/// Server-side validation of an Upgrade request.
///
/// Returns the peer's `Sec-WebSocket-Key` and the negotiated subprotocol,
/// ready to be answered with [`response`].
pub fn check_request<'r>(
    req: &Record<'r>,
    supported: Option<&[&str]>,
) -> Result<(&'r [u8], Option<String>), HandshakeError> {
    match req.get("upgrade") {
        Some(v) if v.eq_ignore_ascii_case(b"websocket") => {}
        _ => return Err(HandshakeError::MissingUpgrade),
    }
    let key = req.get("sec-websocket-key").ok_or(HandshakeError::MissingKey)?;
    if let Some(version) = req.get("sec-websocket-version") {
        if version != b"13" {
            return Err(HandshakeError::BadVersion);
        }
    }

    let protocol = match req.get("sec-websocket-protocol") {
        None => None,
        Some(offered) => {
            let supported = supported.ok_or(HandshakeError::UnexpectedSubprotocolRequest)?;
            Some(negotiate(offered, supported)?)
        }
    };

    Ok((key, protocol))
}

/// Client-side validation of an Upgrade response against the key the
/// client originally sent. Returns the subprotocol echoed by the server.
pub fn check_response(res: &Record<'_>, key: &str) -> Result<Option<String>, HandshakeError> {
    if res.status() != Some(101) {
        return Err(HandshakeError::BadStatus);
    }
    match res.get("connection") {
        Some(v) if v.eq_ignore_ascii_case(b"upgrade") => {}
        _ => return Err(HandshakeError::MissingConnection),
    }
    match res.get("upgrade") {
        Some(v) if v.eq_ignore_ascii_case(b"websocket") => {}
        _ => return Err(HandshakeError::MissingUpgrade),
    }
    if let Some(version) = res.get("sec-websocket-version") {
        if version != b"13" {
            return Err(HandshakeError::BadVersion);
        }
    }
    match res.get("sec-websocket-accept") {
        Some(v) if v == accept_key(key.as_bytes()).as_bytes() => {}
        _ => return Err(HandshakeError::BadAccept),
    }

    Ok(res
        .get("sec-websocket-protocol")
        .map(|p| String::from_utf8_lossy(p).into_owned()))
}

/// First offered protocol that the server also supports, comparing
/// case-sensitively and preserving the peer's preference order.
fn negotiate(offered: &[u8], supported: &[&str]) -> Result<String, HandshakeError> {
    let offered = String::from_utf8_lossy(offered);
    offered
        .split(',')
        .map(str::trim)
        .find(|name| supported.contains(name))
        .map(str::to_owned)
        .ok_or(HandshakeError::NoMatchingSubprotocol)
}
