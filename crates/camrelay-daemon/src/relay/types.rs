//! Relay module types.

/// Why a relay session's forwarding loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The queue stayed empty for the configured number of consecutive polls.
    Idle,
    /// The liveness probe reported the transcoder no longer running.
    ProcessExited,
    /// The client closed its end of the connection.
    Disconnected,
    /// Bind, accept, or forwarding failed with an I/O error.
    Failed(std::io::ErrorKind),
    /// The readiness receiver was dropped before the port was delivered.
    Abandoned,
}

/// Errors from relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to bind relay listener: {0}")]
    Bind(#[source] std::io::Error),
}
