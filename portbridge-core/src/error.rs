use std::io;
use std::result::Result as StdResult;
use thiserror::Error as ThisError;

/// Unified client result type
pub type ClientResult<T> = StdResult<T, ClientError>;

/// Error taxonomy of the client core.
///
/// Per-operation failures are returned through [`ClientResult`];
/// session-fatal kinds additionally produce exactly one disconnect
/// notification through the event channel.
#[derive(Debug, ThisError)]
pub enum ClientError {
    /// No open session, or the session has already closed
    #[error("not connected")]
    NotConnected,

    /// Another request/response cycle is in flight on this session
    #[error("request/response already in flight")]
    Busy,

    /// A deadline elapsed; `phase` names the operation that ran out of budget
    #[error("{phase} timeout")]
    Timeout { phase: &'static str },

    /// The peer closed the connection while an operation was in progress
    #[error("connection closed by peer")]
    Closed,

    /// Rejected before any I/O took place
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Timeout of the connect phase.
    #[inline]
    pub(crate) fn connect_timeout() -> Self {
        ClientError::Timeout { phase: "connect" }
    }

    /// Timeout of the RR receive phase with nothing collected.
    #[inline]
    pub(crate) fn response_timeout() -> Self {
        ClientError::Timeout { phase: "response" }
    }

    /// Timeout of a send loop that could not drain its payload in budget.
    #[inline]
    pub(crate) fn write_timeout() -> Self {
        ClientError::Timeout { phase: "write" }
    }

    /// Whether this error ends the session (and is reported once as a
    /// disconnect event). `Busy`, `NotConnected`, `InvalidArgument` and
    /// timeouts never tear the session down. The session routes every
    /// operation error through this check when deciding whether to
    /// raise its disconnect notification.
    #[inline]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ClientError::Closed | ClientError::Io(_))
    }

    /// Stable camelCase tag carried as `errorKind` in host-facing result
    /// envelopes, next to the human-readable `errorMessage`.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NotConnected => "notConnected",
            ClientError::Busy => "busy",
            ClientError::Timeout { .. } => "timeout",
            ClientError::Closed => "closed",
            ClientError::InvalidArgument(_) => "invalidArgument",
            ClientError::Io(_) => "io",
        }
    }
}

/// `WouldBlock` is never fatal; every non-blocking call checks with this.
#[inline]
pub(crate) fn is_would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

/// Broken-pipe-class errors are reported as a remote disconnect rather
/// than a generic I/O failure.
#[inline]
pub(crate) fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}
