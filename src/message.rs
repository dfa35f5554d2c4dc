//! Outbound payload polymorphism: text becomes a TEXT frame, byte slices
//! become BINARY, so `send("hi")` and `send(bytes)` both read naturally.

use crate::frame::Opcode;

/// A value that can be sent as a single data frame.
pub trait Message {
    /// TEXT for textual payloads, BINARY for byte payloads.
    fn opcode(&self) -> Opcode;
    /// Payload bytes (UTF-8 for text).
    fn payload(&self) -> &[u8];
}

impl<T: Message + ?Sized> Message for &T {
    #[inline]
    fn opcode(&self) -> Opcode {
        T::opcode(self)
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        T::payload(self)
    }
}

impl<T: Message + ?Sized> Message for Box<T> {
    #[inline]
    fn opcode(&self) -> Opcode {
        T::opcode(self)
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        T::payload(self)
    }
}

impl Message for str {
    #[inline]
    fn opcode(&self) -> Opcode {
        Opcode::Text
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Message for String {
    #[inline]
    fn opcode(&self) -> Opcode {
        Opcode::Text
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Message for [u8] {
    #[inline]
    fn opcode(&self) -> Opcode {
        Opcode::Binary
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        self
    }
}

impl<const N: usize> Message for [u8; N] {
    #[inline]
    fn opcode(&self) -> Opcode {
        Opcode::Binary
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        self
    }
}

impl Message for Vec<u8> {
    #[inline]
    fn opcode(&self) -> Opcode {
        Opcode::Binary
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        self
    }
}
