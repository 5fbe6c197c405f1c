//! Transcoder subprocess lifecycle manager.
//!
//! Spawns, monitors, and gracefully stops the external ffmpeg process that
//! reads from the relay's loopback endpoint.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::command::TranscodeCommand;

/// Errors from transcoder operations.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Invalid transcode command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Failed to spawn transcoder: {reason}")]
    Spawn { reason: String },

    #[error("A transcoder is already running")]
    AlreadyRunning,
}

/// Manages the single external transcoder subprocess.
///
/// The liveness probe is synchronous so the relay worker thread can query
/// it between polls; start and stop run in the async domain.
pub struct TranscodeManager {
    ffmpeg_bin: PathBuf,
    child: Mutex<Option<Child>>,
}

impl TranscodeManager {
    pub fn new(ffmpeg_bin: PathBuf) -> Self {
        Self {
            ffmpeg_bin,
            child: Mutex::new(None),
        }
    }

    /// Spawn the transcoder with the given invocation.
    ///
    /// Does not wait for encoding; diagnostics on the subprocess's stderr
    /// stream to the log at debug level. Must be called from within a tokio
    /// runtime.
    pub fn start(&self, cmd: &TranscodeCommand) -> Result<(), TranscodeError> {
        if self.is_available() {
            return Err(TranscodeError::AlreadyRunning);
        }

        let args = cmd.build_args();
        info!(bin = %self.ffmpeg_bin.display(), ?args, "Starting transcoder");
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranscodeError::Spawn {
                reason: e.to_string(),
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("transcoder: {}", line);
                }
                debug!("Transcoder stderr reader finished");
            });
        }

        *self.child.lock() = Some(child);
        Ok(())
    }

    /// True iff the transcoder subprocess exists and is still running.
    pub fn is_available(&self) -> bool {
        let mut slot = self.child.lock();
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Request graceful termination, waiting up to `timeout` before killing.
    ///
    /// The transcoder is treated as stopped regardless of outcome. Calling
    /// with no subprocess is a no-op.
    pub async fn stop(&self, timeout: Duration) {
        let taken = self.child.lock().take();
        let Some(mut child) = taken else {
            return;
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SAFETY: pid comes from our own Child handle; SIGINT asks the
            // transcoder to flush its output before exiting.
            #[allow(unsafe_code)]
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, libc::SIGINT) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                warn!(pid, error = %err, "Failed to send SIGINT to transcoder");
            }
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "Transcoder exited");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for transcoder");
                child.kill().await.ok();
            }
            Err(_) => {
                warn!("Timeout waiting for transcoder shutdown, killing");
                child.kill().await.ok();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn sample_command() -> TranscodeCommand {
        TranscodeCommand::new(1_000_000, "h264", 40123, "rtsp://localhost:8554/cam").unwrap()
    }

    #[tokio::test]
    async fn not_available_without_a_child() {
        let manager = TranscodeManager::new("ffmpeg".into());
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn stop_without_a_child_is_a_noop() {
        let manager = TranscodeManager::new("ffmpeg".into());
        manager.stop(Duration::from_millis(50)).await;
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_error() {
        let manager = TranscodeManager::new("/nonexistent/ffmpeg".into());
        let err = manager.start(&sample_command()).unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
        assert!(!manager.is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn short_lived_child_stops_reporting_available() {
        // `true` ignores the transcoder arguments and exits immediately.
        let manager = TranscodeManager::new("true".into());
        manager.start(&sample_command()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.is_available());

        // Stopping an already-exited child is still fine.
        manager.stop(Duration::from_millis(50)).await;
        assert!(!manager.is_available());
    }
}
