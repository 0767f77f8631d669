//! Result envelopes and event records handed back to the host runtime.
//!
//! Every operation resolves with a record carrying `error` and (on
//! failure) `errorKind` plus `errorMessage`; errors never cross the
//! bridge boundary any other way.

use portbridge_core::{ClientError, ClientEvent, DisconnectReason, RrOutcome};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub connected: bool,
}

impl ConnectResult {
    pub fn ok() -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
            connected: true,
        }
    }

    pub fn err(e: &ClientError) -> Self {
        Self {
            error: true,
            error_kind: Some(e.kind()),
            error_message: Some(e.to_string()),
            connected: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub disconnected: bool,
    pub reading: bool,
}

impl DisconnectResult {
    pub fn ok() -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
            disconnected: true,
            reading: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedResult {
    pub error: bool,
    pub connected: bool,
}

impl ConnectedResult {
    pub fn of(connected: bool) -> Self {
        Self {
            error: false,
            connected,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub reading: bool,
}

impl ReadingResult {
    pub fn of(reading: bool) -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
            reading,
        }
    }

    pub fn err(e: &ClientError) -> Self {
        Self {
            error: true,
            error_kind: Some(e.kind()),
            error_message: Some(e.to_string()),
            reading: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub bytes_sent: usize,
}

impl WriteResult {
    pub fn ok(bytes_sent: usize) -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
            bytes_sent,
        }
    }

    pub fn err(e: &ClientError) -> Self {
        Self {
            error: true,
            error_kind: Some(e.kind()),
            error_message: Some(e.to_string()),
            bytes_sent: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReadTimeoutResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SetReadTimeoutResult {
    pub fn ok() -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn err(e: &ClientError) -> Self {
        Self {
            error: true,
            error_kind: Some(e.kind()),
            error_message: Some(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAndReadResult {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub bytes_sent: usize,
    pub bytes_read: usize,
    pub data: Vec<u8>,
    pub matched: bool,
}

impl WriteAndReadResult {
    pub fn ok(outcome: &RrOutcome) -> Self {
        Self {
            error: false,
            error_kind: None,
            error_message: None,
            bytes_sent: outcome.bytes_sent,
            bytes_read: outcome.data.len(),
            data: outcome.data.to_vec(),
            matched: outcome.matched,
        }
    }

    /// A receive-phase timeout still reports the full request length:
    /// the write completed before the read phase blocked, and callers
    /// use that to tell "no reply" from "nothing sent".
    pub fn err(e: &ClientError, request_len: usize) -> Self {
        let bytes_sent = match e {
            ClientError::Timeout { phase } if *phase == "response" => request_len,
            _ => 0,
        };
        Self {
            error: true,
            error_kind: Some(e.kind()),
            error_message: Some(e.to_string()),
            bytes_sent,
            bytes_read: 0,
            data: Vec::new(),
            matched: false,
        }
    }
}

/// Event record for host listeners, mirroring the two event kinds.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HostEvent {
    Data {
        data: Vec<u8>,
    },
    Disconnect {
        disconnected: bool,
        reading: bool,
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HostEvent {
    /// Listener name the host dispatches on.
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::Data { .. } => "data",
            HostEvent::Disconnect { .. } => "disconnect",
        }
    }
}

impl From<ClientEvent> for HostEvent {
    fn from(ev: ClientEvent) -> Self {
        match ev {
            ClientEvent::Data(bytes) => HostEvent::Data {
                data: bytes.to_vec(),
            },
            ClientEvent::Disconnected(reason) => HostEvent::Disconnect {
                disconnected: true,
                reading: false,
                reason: reason.tag(),
                error: match reason {
                    DisconnectReason::Error(msg) => Some(msg),
                    _ => None,
                },
            },
        }
    }
}
