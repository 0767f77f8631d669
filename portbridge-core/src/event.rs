use bytes::Bytes;

/// Why a session ended. Exactly one reason is reported per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Caller-initiated teardown
    Manual,
    /// Peer closed its send direction (read of 0 bytes)
    Remote,
    /// Fatal I/O or protocol failure, with a human-readable message
    Error(String),
}

impl DisconnectReason {
    /// Stable lowercase tag used by host-facing event records.
    pub fn tag(&self) -> &'static str {
        match self {
            DisconnectReason::Manual => "manual",
            DisconnectReason::Remote => "remote",
            DisconnectReason::Error(_) => "error",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            DisconnectReason::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events fanned out to host listeners.
///
/// `Data` payloads are a faithful, order-preserving copy of socket bytes,
/// sliced to the configured chunk size. `Disconnected` is emitted at most
/// once per session and never before a `Data` event whose bytes arrived
/// first.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Non-empty batch slice from the stream reader
    Data(Bytes),
    /// Session ended; at most one per session
    Disconnected(DisconnectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_tags() {
        assert_eq!(DisconnectReason::Manual.tag(), "manual");
        assert_eq!(DisconnectReason::Remote.tag(), "remote");
        let err = DisconnectReason::Error("broken pipe".into());
        assert_eq!(err.tag(), "error");
        assert_eq!(err.message(), Some("broken pipe"));
        assert_eq!(DisconnectReason::Remote.message(), None);
    }
}
