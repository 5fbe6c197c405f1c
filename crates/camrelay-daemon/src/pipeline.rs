//! Stream pipeline: relay worker and transcoder lifecycle bridging.
//!
//! Control flow: the pipeline launches the relay worker on the blocking
//! pool, awaits the readiness signal for the bound port, then starts the
//! transcoder pointed at that port. Once the forwarding loop ends, the
//! worker crosses back into the async domain to stop the transcoder before
//! the worker itself exits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use camrelay_core::frame::CameraStream;

use crate::relay::{FrameRelay, RelayError, SessionEnd};
use crate::transcode::{TranscodeCommand, TranscodeError, TranscodeManager};

/// Errors from pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Transcoder error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Relay worker exited before reporting a port")]
    WorkerGone,

    #[error("A relay session is already active")]
    SessionActive,
}

/// Bridges one camera stream to one transcoder subprocess.
///
/// At most one session is active per pipeline; a finished session leaves
/// the pipeline reusable for a fresh [`StreamPipeline::start`].
pub struct StreamPipeline {
    camera: Arc<CameraStream>,
    relay: Arc<FrameRelay>,
    transcoder: Arc<TranscodeManager>,
    stop_timeout: Duration,
    write_report: bool,
    worker: Mutex<Option<JoinHandle<SessionEnd>>>,
}

impl StreamPipeline {
    pub fn new(
        camera: Arc<CameraStream>,
        relay: Arc<FrameRelay>,
        transcoder: Arc<TranscodeManager>,
        stop_timeout: Duration,
        write_report: bool,
    ) -> Self {
        Self {
            camera,
            relay,
            transcoder,
            stop_timeout,
            write_report,
            worker: Mutex::new(None),
        }
    }

    /// Start a relay session and the transcoder against its bound port.
    ///
    /// Returns the port once the transcoder has been spawned. The caller
    /// never sees a started transcoder without a valid port: a bind failure
    /// arrives through the readiness signal before any spawn is attempted.
    pub async fn start(&self, analyze_duration: u64) -> Result<u16, PipelineError> {
        {
            let worker = self.worker.lock();
            if worker.as_ref().is_some_and(|w| !w.is_finished()) {
                return Err(PipelineError::SessionActive);
            }
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let relay = Arc::clone(&self.relay);
        let transcoder = Arc::clone(&self.transcoder);
        let stop_timeout = self.stop_timeout;
        let handle = Handle::current();
        let worker = tokio::task::spawn_blocking(move || {
            let probe = Arc::clone(&transcoder);
            let end = relay.run_session(ready_tx, move || probe.is_available());
            // The transcoder must be stopped before the worker exits; this
            // blocks the worker thread on the async stop.
            handle.block_on(transcoder.stop(stop_timeout));
            end
        });
        *self.worker.lock() = Some(worker);

        let port = match ready_rx.await {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => return Err(PipelineError::Relay(e)),
            Err(_) => return Err(PipelineError::WorkerGone),
        };

        let cmd = TranscodeCommand::new(
            analyze_duration,
            self.camera.codec.as_str(),
            port,
            self.camera.stream_url.as_str(),
        )?
        .with_report(self.write_report);

        if let Err(e) = self.transcoder.start(&cmd) {
            warn!(error = %e, "Transcoder failed to start, releasing relay worker");
            release_pending_accept(port).await;
            return Err(e.into());
        }

        info!(camera = %self.camera.id, port, "Stream pipeline started");
        Ok(port)
    }

    /// Stop the transcoder and wait for the relay worker to finish.
    ///
    /// Stopping the subprocess flips the worker's liveness probe, so the
    /// forwarding loop exits on its next poll. Idempotent.
    pub async fn shutdown(&self) -> Option<SessionEnd> {
        self.transcoder.stop(self.stop_timeout).await;
        if let Some(port) = self.relay.port() {
            // Release the accept in case no client ever connected.
            release_pending_accept(port).await;
        }
        self.join().await
    }

    /// Wait for the active relay session, if any, to finish.
    ///
    /// Cancel-safe: the worker handle stays in place until it completes, so
    /// a dropped `join` future (e.g. losing a `select!`) does not detach
    /// the session.
    pub async fn join(&self) -> Option<SessionEnd> {
        let result = std::future::poll_fn(|cx| {
            let mut guard = self.worker.lock();
            match guard.as_mut() {
                None => Poll::Ready(None),
                Some(worker) => match Pin::new(worker).poll(cx) {
                    Poll::Ready(res) => {
                        *guard = None;
                        Poll::Ready(Some(res))
                    }
                    Poll::Pending => Poll::Pending,
                },
            }
        })
        .await;

        match result {
            Some(Ok(end)) => Some(end),
            Some(Err(e)) => {
                warn!(error = %e, "Relay worker panicked");
                None
            }
            None => None,
        }
    }
}

/// Connect-and-drop against the bound port so a worker blocked in accept
/// can proceed to teardown.
async fn release_pending_accept(port: u16) {
    match tokio::net::TcpStream::connect(("localhost", port)).await {
        Ok(stream) => drop(stream),
        Err(e) => debug!(port, error = %e, "Relay release connection failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn test_pipeline(ffmpeg_bin: &str) -> (StreamPipeline, Arc<FrameRelay>) {
        let camera = Arc::new(CameraStream::new("h264", "rtsp://localhost:8554/cam"));
        let relay = Arc::new(FrameRelay::new(
            Arc::clone(&camera.video_queue),
            Duration::from_millis(10),
            3,
        ));
        let transcoder = Arc::new(TranscodeManager::new(ffmpeg_bin.into()));
        let pipeline = StreamPipeline::new(
            camera,
            Arc::clone(&relay),
            transcoder,
            Duration::from_millis(100),
            false,
        );
        (pipeline, relay)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_binary_fails_start_and_releases_worker() {
        let (pipeline, relay) = test_pipeline("/nonexistent/ffmpeg");

        let err = pipeline.start(1_000_000).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transcode(TranscodeError::Spawn { .. })
        ));

        // The release connection lets the worker tear down on its own.
        let end = pipeline.join().await;
        assert_eq!(end, Some(SessionEnd::ProcessExited));
        assert_eq!(relay.port(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_without_session_returns_none() {
        let (pipeline, _relay) = test_pipeline("ffmpeg");
        assert_eq!(pipeline.join().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_is_idempotent() {
        let (pipeline, _relay) = test_pipeline("ffmpeg");
        assert_eq!(pipeline.shutdown().await, None);
        assert_eq!(pipeline.shutdown().await, None);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_lived_transcoder_ends_session_via_liveness() {
        // `true` exits immediately, so the worker's liveness probe turns
        // false on its first poll after the release connection arrives.
        let (pipeline, relay) = test_pipeline("true");

        let port = pipeline.start(1_000_000).await.unwrap();
        assert!(port > 0);

        // The fake transcoder never connects; shut the session down.
        let end = pipeline.shutdown().await;
        assert_eq!(end, Some(SessionEnd::ProcessExited));
        assert_eq!(relay.port(), None);
    }
}
