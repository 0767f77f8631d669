//! Operation dispatch: one entry point per host operation, each taking a
//! raw JSON argument record and resolving to a result envelope. Nothing
//! here returns `Err` or panics across the boundary.

use crate::{
    args::{ConnectArgs, SetReadTimeoutArgs, StartReadArgs, WriteAndReadArgs, WriteArgs},
    envelope::{
        ConnectResult, ConnectedResult, DisconnectResult, HostEvent, ReadingResult,
        SetReadTimeoutResult, WriteAndReadResult, WriteResult,
    },
};
use portbridge_core::{ClientError, ClientEvent, TcpClient};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Host-facing wrapper around one [`TcpClient`].
#[derive(Clone, Default)]
pub struct TcpBridge {
    client: TcpClient,
}

impl TcpBridge {
    pub fn new() -> Self {
        Self {
            client: TcpClient::new(),
        }
    }

    /// Direct access to the underlying client, for hosts that prefer the
    /// typed API over JSON records.
    pub fn client(&self) -> &TcpClient {
        &self.client
    }

    /// Subscribe to the raw event stream; map through [`HostEvent`] for
    /// the record shapes listeners expect.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.client.subscribe_events()
    }

    pub async fn connect(&self, args: Value) -> ConnectResult {
        let args: ConnectArgs = match decode(args) {
            Ok(a) => a,
            Err(e) => return ConnectResult::err(&e),
        };
        match self.client.connect(args.into()).await {
            Ok(()) => ConnectResult::ok(),
            Err(e) => ConnectResult::err(&e),
        }
    }

    pub async fn disconnect(&self) -> DisconnectResult {
        // Infallible by contract: teardown is idempotent.
        let _ = self.client.disconnect().await;
        DisconnectResult::ok()
    }

    pub fn is_connected(&self) -> ConnectedResult {
        ConnectedResult::of(self.client.is_connected())
    }

    pub fn is_reading(&self) -> ReadingResult {
        ReadingResult::of(self.client.is_reading())
    }

    pub async fn write(&self, args: Value) -> WriteResult {
        let args: WriteArgs = match decode(args) {
            Ok(a) => a,
            Err(e) => return WriteResult::err(&e),
        };
        match self.client.write(&args.data).await {
            Ok(n) => WriteResult::ok(n),
            Err(e) => WriteResult::err(&e),
        }
    }

    pub async fn start_read(&self, args: Value) -> ReadingResult {
        let args: StartReadArgs = match decode(args) {
            Ok(a) => a,
            Err(e) => return ReadingResult::err(&e),
        };
        match self.client.start_read(args.into()).await {
            Ok(reading) => ReadingResult::of(reading),
            Err(e) => ReadingResult::err(&e),
        }
    }

    pub async fn stop_read(&self) -> ReadingResult {
        match self.client.stop_read().await {
            Ok(reading) => ReadingResult::of(reading),
            Err(e) => ReadingResult::err(&e),
        }
    }

    pub fn set_read_timeout(&self, args: Value) -> SetReadTimeoutResult {
        let args: SetReadTimeoutArgs = match decode(args) {
            Ok(a) => a,
            Err(e) => return SetReadTimeoutResult::err(&e),
        };
        self.client
            .set_read_timeout(Duration::from_millis(args.ms));
        SetReadTimeoutResult::ok()
    }

    pub async fn write_and_read(&self, args: Value) -> WriteAndReadResult {
        let args: WriteAndReadArgs = match decode(args) {
            Ok(a) => a,
            Err(e) => return WriteAndReadResult::err(&e, 0),
        };
        let request_len = args.data.len();
        let req = match args.into_request() {
            Ok(r) => r,
            Err(e) => return WriteAndReadResult::err(&e, 0),
        };
        match self.client.write_and_read(req).await {
            Ok(outcome) => WriteAndReadResult::ok(&outcome),
            Err(e) => {
                debug!(error = %e, "writeAndRead failed");
                WriteAndReadResult::err(&e, request_len)
            }
        }
    }

    /// Drain the next event as a host record; `None` when the client (and
    /// with it the sender) is gone.
    pub async fn next_event(
        rx: &mut broadcast::Receiver<ClientEvent>,
    ) -> Option<HostEvent> {
        loop {
            match rx.recv().await {
                Ok(ev) => return Some(ev.into()),
                // A lagged listener skips what it missed and keeps going.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::InvalidArgument(e.to_string()))
}
