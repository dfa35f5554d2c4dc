#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod codec;
mod connection;
mod errors;
mod frame;
mod mask;
mod message;

pub mod handshake;
pub mod http;

pub use connection::{Config, Connection, Event};
pub use errors::{Error, HandshakeError};
pub use frame::{CloseCode, Frame, Opcode};
pub use message::Message;

/// Type parameter for `Connection<SERVER, IO>`: the endpoint that accepted
/// the upgrade. Requires masked input, sends unmasked output.
pub const SERVER: bool = true;

/// Type parameter for `Connection<CLIENT, IO>`: the endpoint that initiated
/// the upgrade. Requires unmasked input, masks everything it sends.
pub const CLIENT: bool = false;
