//! Single-connection TCP client core for line-oriented device peers.
//!
//! One [`TcpClient`] owns at most one session at a time and exposes
//! three intertwined behaviors: a connect/disconnect lifecycle, a
//! streaming read path delivering batched [`ClientEvent::Data`] events,
//! and an atomic write-then-read cycle with a deadline, a response cap,
//! optional pattern early-exit and adaptive idle detection.

mod batcher;
mod client;
mod pattern;
mod reader;
mod rr;
mod session;
mod socket;

pub mod config;
pub mod error;
pub mod event;
pub mod state;

pub use client::{ClientStats, TcpClient};
pub use config::{ConnectConfig, ReadConfig, RrOutcome, RrRequest};
pub use error::{ClientError, ClientResult};
pub use event::{ClientEvent, DisconnectReason};
pub use state::ConnState;
