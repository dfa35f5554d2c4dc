//! Frame and close-code types shared by the codec and the connection.

/// Defines the interpretation of the payload. An unknown opcode fails the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// A fragment of a larger message. This crate does not reassemble
    /// fragmented messages; receiving one drives a graceful local close.
    Continue = 0,
    /// UTF-8 text payload.
    Text = 1,
    /// Arbitrary binary payload.
    Binary = 2,
    /// Close handshake frame. The body, when present, starts with a 2-byte
    /// big-endian status code followed by a UTF-8 reason.
    Close = 8,
    /// Keepalive request; the peer answers with a [`Opcode::Pong`] carrying
    /// the identical payload.
    Ping = 9,
    /// Answer to a ping, or an unsolicited unidirectional heartbeat.
    Pong = 10,
}

impl Opcode {
    /// Decodes the low nibble of the first header byte. The nibbles RFC
    /// 6455 reserves (3-7 and 11-15) come back as `None` and fail the
    /// connection.
    pub fn from_wire(nibble: u8) -> Option<Self> {
        Some(match nibble {
            0 => Opcode::Continue,
            1 => Opcode::Text,
            2 => Opcode::Binary,
            8 => Opcode::Close,
            9 => Opcode::Ping,
            10 => Opcode::Pong,
            _ => return None,
        })
    }

    /// Whether the opcode indicates a control frame.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A single decoded frame. The payload is already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final-fragment bit. Everything this crate dispatches has it set;
    /// a clear bit makes the connection wind down gracefully.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Whether a masking key was present on the wire.
    pub masked: bool,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Close code and reason carried by a CLOSE frame body.
    ///
    /// Returns `(None, None)` for bodies shorter than the mandatory 2-byte
    /// code, including the malformed 1-byte body some peers emit.
    pub fn close_params(&self) -> (Option<u16>, Option<String>) {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return (None, None);
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = (self.payload.len() > 2)
            .then(|| String::from_utf8_lossy(&self.payload[2..]).into_owned());
        (Some(code), reason)
    }
}

/// When closing an established connection an endpoint MAY indicate a reason
/// for closure.
///
/// The reserved and pseudo codes (1004, 1005, 1006, 1015) are deliberately
/// absent: they never legally travel on the wire from a conforming peer, and
/// unknown numeric codes are reported as numeric-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// The purpose for which the connection was established has been fulfilled.
    Normal = 1000,
    /// Server going down or a browser having navigated away from a page.
    GoingAway = 1001,
    /// An endpoint is terminating the connection due to a protocol error.
    ProtocolError = 1002,
    /// It has received a type of data it cannot accept.
    Unacceptable = 1003,
    /// Payload data inconsistent with the type of the message.
    Malformed = 1007,
    /// Generic code for when no more suitable code exists.
    PolicyViolation = 1008,
    /// Message too big to process.
    TooBig = 1009,
    /// The client expected the server to negotiate one or more extensions.
    MissingExtension = 1010,
    /// The server encountered an unexpected condition.
    UnexpectedError = 1011,
}

impl CloseCode {
    /// Maps a wire integer to its symbolic code, or `None` for integers
    /// outside the table.
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unacceptable,
            1007 => CloseCode::Malformed,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::TooBig,
            1010 => CloseCode::MissingExtension,
            1011 => CloseCode::UnexpectedError,
            _ => return None,
        })
    }

    /// Symbolic name of the code.
    pub fn name(self) -> &'static str {
        match self {
            CloseCode::Normal => "NORMAL",
            CloseCode::GoingAway => "GOING_AWAY",
            CloseCode::ProtocolError => "PROTOCOL_ERROR",
            CloseCode::Unacceptable => "UNACCEPTABLE",
            CloseCode::Malformed => "MALFORMED",
            CloseCode::PolicyViolation => "POLICY_VIOLATION",
            CloseCode::TooBig => "TOO_BIG",
            CloseCode::MissingExtension => "MISSING_EXTENSION",
            CloseCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

impl From<CloseCode> for u16 {
    #[inline]
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_table() {
        assert_eq!(CloseCode::from_u16(1000), Some(CloseCode::Normal));
        assert_eq!(CloseCode::from_u16(1009), Some(CloseCode::TooBig));
        assert_eq!(u16::from(CloseCode::MissingExtension), 1010);
        assert_eq!(CloseCode::Normal.name(), "NORMAL");
        assert_eq!(CloseCode::GoingAway.name(), "GOING_AWAY");

        // reserved and pseudo codes stay numeric-only
        for code in [1004, 1005, 1006, 1015, 3000, 4999] {
            assert_eq!(CloseCode::from_u16(code), None);
        }
    }

    #[test]
    fn close_params() {
        let frame = Frame {
            fin: true,
            opcode: Opcode::Close,
            masked: false,
            payload: vec![0x03, 0xE8, b'b', b'y', b'e'],
        };
        assert_eq!(frame.close_params(), (Some(1000), Some("bye".into())));

        let code_only = Frame {
            payload: vec![0x03, 0xE9],
            ..frame.clone()
        };
        assert_eq!(code_only.close_params(), (Some(1001), None));

        let malformed = Frame {
            payload: vec![0x03],
            ..frame
        };
        assert_eq!(malformed.close_params(), (None, None));
    }

    #[test]
    fn opcode_nibbles() {
        assert_eq!(Opcode::from_wire(0x1), Some(Opcode::Text));
        assert_eq!(Opcode::from_wire(0xA), Some(Opcode::Pong));
        assert_eq!(Opcode::from_wire(0x3), None);
        assert_eq!(Opcode::from_wire(0xF), None);
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Continue.is_control());
    }
}
