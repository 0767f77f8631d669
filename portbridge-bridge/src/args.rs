//! Structured argument records for the host-facing operations.
//!
//! Field names and defaults follow the plugin option table: camelCase
//! keys, `port` 9100, connect `timeout` 3000 ms, RR `timeout` 1000 ms,
//! `chunkSize`/`maxBytes` 4096, boolean knobs defaulting to `true`.

use crate::expect::ExpectInput;
use portbridge_core::{ClientError, ConnectConfig, ReadConfig, RrRequest};
use serde::Deserialize;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    9100
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_rr_timeout_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    4096
}

fn default_max_bytes() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectArgs {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub no_delay: bool,
    #[serde(default = "default_true")]
    pub keep_alive: bool,
}

impl From<ConnectArgs> for ConnectConfig {
    fn from(a: ConnectArgs) -> Self {
        ConnectConfig {
            host: a.host,
            port: a.port,
            timeout: Duration::from_millis(a.timeout),
            no_delay: a.no_delay,
            keep_alive: a.keep_alive,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteArgs {
    /// Byte values 0..=255
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReadArgs {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Advisory reader idle tick in milliseconds
    #[serde(default)]
    pub read_timeout: Option<u64>,
}

impl From<StartReadArgs> for ReadConfig {
    fn from(a: StartReadArgs) -> Self {
        ReadConfig {
            chunk_size: a.chunk_size,
            read_timeout: a.read_timeout.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReadTimeoutArgs {
    #[serde(default = "default_read_timeout_ms")]
    pub ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAndReadArgs {
    pub data: Vec<u8>,
    /// Global RR deadline in milliseconds
    #[serde(default = "default_rr_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub expect: Option<ExpectInput>,
    #[serde(default = "default_true", rename = "suspendStreamDuringRR")]
    pub suspend_stream_during_rr: bool,
}

impl WriteAndReadArgs {
    /// Normalize into the core request; malformed `expect` input fails
    /// here, before any I/O.
    pub fn into_request(self) -> Result<RrRequest, ClientError> {
        let expect = match &self.expect {
            Some(input) => Some(input.normalize()?),
            None => None,
        };
        Ok(RrRequest {
            payload: self.data.into(),
            timeout: Duration::from_millis(self.timeout),
            max_bytes: self.max_bytes,
            expect,
            suspend_stream: self.suspend_stream_during_rr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_defaults() {
        let args: ConnectArgs = serde_json::from_value(json!({"host": "10.0.0.5"})).unwrap();
        assert_eq!(args.port, 9100);
        assert_eq!(args.timeout, 3000);
        assert!(args.no_delay);
        assert!(args.keep_alive);

        let cfg: ConnectConfig = args.into();
        assert_eq!(cfg.timeout, Duration::from_millis(3000));
    }

    #[test]
    fn connect_overrides() {
        let args: ConnectArgs = serde_json::from_value(json!({
            "host": "printer.local",
            "port": 515,
            "timeout": 250,
            "noDelay": false,
            "keepAlive": false,
        }))
        .unwrap();
        assert_eq!(args.port, 515);
        assert_eq!(args.timeout, 250);
        assert!(!args.no_delay);
        assert!(!args.keep_alive);
    }

    #[test]
    fn start_read_defaults() {
        let args: StartReadArgs = serde_json::from_value(json!({})).unwrap();
        assert_eq!(args.chunk_size, 4096);
        assert_eq!(args.read_timeout, None);

        let args: StartReadArgs =
            serde_json::from_value(json!({"chunkSize": 512, "readTimeout": 200})).unwrap();
        assert_eq!(args.chunk_size, 512);
        assert_eq!(args.read_timeout, Some(200));
    }

    #[test]
    fn write_and_read_defaults_and_rr_key() {
        let args: WriteAndReadArgs =
            serde_json::from_value(json!({"data": [16, 4, 1]})).unwrap();
        assert_eq!(args.timeout, 1000);
        assert_eq!(args.max_bytes, 4096);
        assert!(args.suspend_stream_during_rr);

        // The option key spells RR in capitals.
        let args: WriteAndReadArgs = serde_json::from_value(json!({
            "data": [1],
            "suspendStreamDuringRR": false,
        }))
        .unwrap();
        assert!(!args.suspend_stream_during_rr);
    }

    #[test]
    fn write_and_read_expect_forms() {
        let args: WriteAndReadArgs = serde_json::from_value(json!({
            "data": [16, 4, 1],
            "expect": "00",
        }))
        .unwrap();
        let req = args.into_request().unwrap();
        assert_eq!(req.expect.as_deref(), Some(&[0x00][..]));

        let args: WriteAndReadArgs = serde_json::from_value(json!({
            "data": [16, 4, 1],
            "expect": [255, 255],
        }))
        .unwrap();
        let req = args.into_request().unwrap();
        assert_eq!(req.expect.as_deref(), Some(&[0xFF, 0xFF][..]));

        let args: WriteAndReadArgs = serde_json::from_value(json!({
            "data": [1],
            "expect": "abc",
        }))
        .unwrap();
        assert!(args.into_request().is_err());
    }
}
