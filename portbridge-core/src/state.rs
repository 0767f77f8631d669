/// Connection state exposed to API consumers.
///
/// Transitions are driven only by the coordinator:
/// `Idle -> Connecting -> Open -> Closing -> Closed`, with a failed
/// connect falling back to `Idle` (no disconnect event, no session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// No connection attempt yet, or the last attempt failed
    #[default]
    Idle,
    /// Transport connect in progress
    Connecting,
    /// Session established; socket handle valid
    Open,
    /// Graceful teardown in progress
    Closing,
    /// Session ended; operations fail fast with `NotConnected`
    Closed,
}

impl ConnState {
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, ConnState::Open)
    }
}
