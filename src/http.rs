//! Minimal parsed view of an HTTP/1.1 message head.
//!
//! The upgrade handshake itself belongs to the host application's HTTP
//! stack; the factories in this crate only need the parsed head. [`Record`]
//! is that input type, plus a zero-copy parser for hosts that hand us raw
//! bytes. `from_raw` advances the input slice past the blank line, so
//! whatever remains afterwards is exactly the residual byte slice the
//! connection factories expect.

use std::str;

/// A parsed request or response head: the start line plus header fields.
///
/// ```rust
/// let mut bytes = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\nGARBAGE".as_bytes();
/// let head = ws_driver::http::Record::from_raw(&mut bytes).unwrap();
///
/// assert_eq!(head.status(), Some(101));
/// assert_eq!(head.get("UPGRADE"), Some("websocket".as_bytes()));
/// assert_eq!(bytes, b"GARBAGE"); // residual stays with the caller
/// ```
#[derive(Default, Clone)]
pub struct Record<'a> {
    /// Verbatim start line, e.g. `GET /chat HTTP/1.1`.
    pub schema: &'a [u8],
    /// Header fields in arrival order, names verbatim.
    pub header: Vec<(&'a [u8], &'a [u8])>,
}

const HTTP_EOF_ERR: &str = "HTTP parse error: unexpected end";

impl<'a> Record<'a> {
    /// First value for a header name, compared case-insensitively.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&'a [u8]> {
        let key = key.as_ref();
        self.header
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(key).then_some(*v))
    }

    /// Status code of a response start line, `None` for requests or
    /// mangled lines.
    pub fn status(&self) -> Option<u16> {
        let schema = str::from_utf8(self.schema).ok()?;
        if !schema.starts_with("HTTP/") {
            return None;
        }
        schema.split_ascii_whitespace().nth(1)?.parse().ok()
    }

    /// Parses a message head, consuming `bytes` through the terminating
    /// blank line. Whatever is left in `bytes` was over-read past the head.
    ///
    /// `bytes` is only advanced on success; a truncated or mangled head
    /// leaves it untouched.
    pub fn from_raw(bytes: &mut &'a [u8]) -> Result<Self, &'static str> {
        let mut rest = *bytes;
        let schema = next_line(&mut rest).ok_or(HTTP_EOF_ERR)?;
        let mut header = vec![];
        loop {
            let line = next_line(&mut rest).ok_or(HTTP_EOF_ERR)?;
            if line.is_empty() {
                break;
            }
            let colon = line
                .iter()
                .position(|&byte| byte == b':')
                .ok_or("HTTP parse error: header field without a colon")?;
            header.push((&line[..colon], line[colon + 1..].trim_ascii()));
        }
        *bytes = rest;
        Ok(Self { schema, header })
    }
}

/// Next line with its terminator (and any trailing CR) stripped; advances
/// `rest` past it. `None` when no full line is buffered yet.
fn next_line<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let buf = *rest;
    let nl = buf.iter().position(|&byte| byte == b'\n')?;
    *rest = &buf[nl + 1..];
    let line = &buf[..nl];
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

impl std::fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut header = vec![];
        for (key, value) in &self.header {
            if let (Ok(key), Ok(value)) = (str::from_utf8(key), str::from_utf8(value)) {
                header.push((key, value));
            }
        }
        f.debug_struct("Record")
            .field("schema", &str::from_utf8(self.schema))
            .field("header", &header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_head_and_leaves_residual() {
        let mut bytes =
            b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade:  websocket \r\n\r\n\x81\x05Hello"
                .as_slice();
        let head = Record::from_raw(&mut bytes).unwrap();
        assert_eq!(head.schema, b"GET /chat HTTP/1.1");
        assert_eq!(head.get("host"), Some(b"example.com".as_slice()));
        assert_eq!(head.get("upgrade"), Some(b"websocket".as_slice()));
        assert_eq!(head.status(), None);
        assert_eq!(bytes, b"\x81\x05Hello");
    }

    #[test]
    fn parses_response_status() {
        let mut bytes = b"HTTP/1.1 400 Bad Request\r\n\r\n".as_slice();
        let head = Record::from_raw(&mut bytes).unwrap();
        assert_eq!(head.status(), Some(400));
        assert!(bytes.is_empty());
    }

    #[test]
    fn truncated_head_is_an_error_and_consumes_nothing() {
        let mut bytes = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n".as_slice();
        let original = bytes;
        assert!(Record::from_raw(&mut bytes).is_err());
        assert_eq!(bytes, original);
    }

    #[test]
    fn header_field_without_a_colon_is_an_error() {
        let mut bytes = b"GET / HTTP/1.1\r\nnot a header line\r\n\r\n".as_slice();
        assert!(Record::from_raw(&mut bytes).is_err());
    }
}
