//! Loopback TCP relay: bind, accept one client, forward queued frames.
//!
//! The forwarding loop is blocking by design (socket accept plus
//! fixed-interval sleeps) and must run on a dedicated worker thread, never
//! on the tokio scheduler. Lifecycle signals cross back into the async
//! domain through the readiness oneshot and the pipeline's stop handoff.

use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use camrelay_core::frame::FrameQueue;

use super::types::{RelayError, SessionEnd};

/// Readiness signal fulfilled once the listener port is bound.
///
/// Carries the resolved port on success; a bind failure travels through the
/// same channel so the caller never starts the transcoder without a port.
pub type ReadySignal = oneshot::Sender<Result<u16, RelayError>>;

/// Relay listener: owns the bound loopback socket and the accept/forward
/// loop.
///
/// At most one session is active at a time; the bound port is observable
/// through [`FrameRelay::port`] only while a session is live. The relay is
/// reusable -- a later session binds a fresh port.
pub struct FrameRelay {
    queue: Arc<FrameQueue>,
    poll_interval: Duration,
    idle_poll_limit: u32,
    current_port: Mutex<Option<u16>>,
}

/// Per-session socket state. Dropped on every exit path, which closes the
/// listener (and the client socket, owned by the forwarding loop).
struct RelaySession {
    listener: TcpListener,
    port: u16,
}

impl RelaySession {
    fn bind() -> Result<Self, RelayError> {
        let listener = TcpListener::bind(("localhost", 0)).map_err(RelayError::Bind)?;
        let port = listener.local_addr().map_err(RelayError::Bind)?.port();
        Ok(Self { listener, port })
    }
}

impl FrameRelay {
    pub fn new(queue: Arc<FrameQueue>, poll_interval: Duration, idle_poll_limit: u32) -> Self {
        Self {
            queue,
            poll_interval,
            idle_poll_limit,
            current_port: Mutex::new(None),
        }
    }

    /// Port bound by the active session, if any.
    pub fn port(&self) -> Option<u16> {
        *self.current_port.lock()
    }

    /// Run one relay session to completion on the calling thread.
    ///
    /// Binds an ephemeral loopback port, reports it through `ready`, then
    /// blocks until a single client connects and forwards queued frames to
    /// it until the idle cutoff is reached or `is_live` turns false. The
    /// bound port is cleared before returning.
    pub fn run_session<F>(&self, ready: ReadySignal, is_live: F) -> SessionEnd
    where
        F: Fn() -> bool,
    {
        let session = match RelaySession::bind() {
            Ok(session) => session,
            Err(RelayError::Bind(e)) => {
                let kind = e.kind();
                warn!(error = %e, "Relay bind failed");
                let _ = ready.send(Err(RelayError::Bind(e)));
                return SessionEnd::Failed(kind);
            }
        };

        *self.current_port.lock() = Some(session.port);
        info!(port = session.port, "Relay bound, waiting for client");

        if ready.send(Ok(session.port)).is_err() {
            // Nobody will start a transcoder against this port.
            warn!(port = session.port, "Readiness receiver dropped, abandoning session");
            *self.current_port.lock() = None;
            return SessionEnd::Abandoned;
        }

        let end = self.accept_and_forward(&session, &is_live);
        match end {
            SessionEnd::Idle => {
                info!(port = session.port, "Relay session idle cutoff reached");
            }
            SessionEnd::ProcessExited => {
                info!(port = session.port, "Transcoder gone, relay session closing");
            }
            SessionEnd::Disconnected => {
                info!(port = session.port, "Relay client disconnected");
            }
            SessionEnd::Failed(kind) => {
                warn!(port = session.port, ?kind, "Relay session ended on I/O error");
            }
            SessionEnd::Abandoned => {}
        }

        *self.current_port.lock() = None;
        end
    }

    /// Accept exactly one client and forward queued frames until a stop
    /// condition. Forwarding errors end the loop; they are never propagated.
    fn accept_and_forward<F>(&self, session: &RelaySession, is_live: &F) -> SessionEnd
    where
        F: Fn() -> bool,
    {
        let (mut client, peer) = match session.listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Relay accept failed");
                return SessionEnd::Failed(e.kind());
            }
        };
        debug!(peer = %peer, "Relay client connected");

        // Forwarding writes must not block indefinitely on a slow reader;
        // the poll cadence bounds how much is written per iteration.
        if let Err(e) = client.set_nonblocking(true) {
            warn!(error = %e, "Failed to set relay client non-blocking");
            return SessionEnd::Failed(e.kind());
        }

        let mut idle_polls = 0u32;
        while idle_polls < self.idle_poll_limit {
            if !is_live() {
                return SessionEnd::ProcessExited;
            }
            debug!(queued = self.queue.len(), idle_polls, "Relay poll");
            if self.queue.is_empty() {
                idle_polls += 1;
            } else {
                idle_polls = 0;
                if let Err(end) = drain_queue(&self.queue, &mut client) {
                    return end;
                }
            }
            thread::sleep(self.poll_interval);
        }
        SessionEnd::Idle
    }
}

/// Write every currently-queued frame to the client, one write per frame,
/// in FIFO order. Frame boundaries are not preserved on the wire.
fn drain_queue(queue: &FrameQueue, client: &mut TcpStream) -> Result<(), SessionEnd> {
    while let Some(frame) = queue.try_pop() {
        if let Err(e) = client.write_all(&frame) {
            return Err(classify_write_error(&e));
        }
    }
    Ok(())
}

/// Distinguish a clean client disconnect from an unexpected fault. Both end
/// the session; the distinction is for the logs.
fn classify_write_error(e: &std::io::Error) -> SessionEnd {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            SessionEnd::Disconnected
        }
        kind => SessionEnd::Failed(kind),
    }
}
