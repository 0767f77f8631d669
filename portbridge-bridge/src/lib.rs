//! Host-facing surface of the portbridge TCP client.
//!
//! The bridge marshals a foreign runtime's operation calls into the core:
//! camelCase argument records in, result envelopes with
//! `{error, errorMessage, ...}` out, and `data`/`disconnect` event records
//! for listeners. Errors are always encoded in the envelope; nothing is
//! thrown across the boundary.

mod args;
mod bridge;
mod envelope;
mod expect;

pub use args::{ConnectArgs, SetReadTimeoutArgs, StartReadArgs, WriteAndReadArgs, WriteArgs};
pub use bridge::TcpBridge;
pub use envelope::{
    ConnectResult, ConnectedResult, DisconnectResult, HostEvent, ReadingResult,
    SetReadTimeoutResult, WriteAndReadResult, WriteResult,
};
pub use expect::{parse_hex, ExpectInput};
