//! Camrelay Daemon
//!
//! Bridges a camera's decoded frame queue to an external ffmpeg transcoder
//! through a loopback TCP relay. Raw frame bytes arrive on stdin and are
//! queued for the relay; the transcoder republishes the stream over RTSP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use camrelay_core::frame::CameraStream;
use camrelay_core::tracing_init::init_tracing;
use camrelay_daemon::pipeline::StreamPipeline;
use camrelay_daemon::relay::FrameRelay;
use camrelay_daemon::transcode::TranscodeManager;

#[derive(Parser, Debug)]
#[command(name = "camrelay-daemon")]
#[command(version, about = "Camrelay daemon - camera to transcoder byte relay")]
struct Args {
    /// Input codec tag of the camera's elementary stream (e.g. "h264", "h265")
    #[arg(long, default_value = "h264", env = "CAMRELAY_CODEC")]
    codec: String,

    /// RTSP publish URL the transcoder pushes to
    #[arg(long, env = "CAMRELAY_STREAM_URL")]
    stream_url: String,

    /// Microseconds of input analysis before the transcoder starts demuxing
    #[arg(long, env = "CAMRELAY_ANALYZEDURATION")]
    analyzeduration: Option<u64>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "CAMRELAY_FFMPEG_BIN")]
    ffmpeg_bin: Option<PathBuf>,

    /// Milliseconds between forwarding polls
    #[arg(long, env = "CAMRELAY_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Consecutive empty polls before the relay session ends
    #[arg(long, env = "CAMRELAY_IDLE_POLL_LIMIT")]
    idle_poll_limit: Option<u32>,

    /// Seconds to wait for graceful transcoder shutdown before killing
    #[arg(long, env = "CAMRELAY_STOP_TIMEOUT")]
    stop_timeout: Option<u64>,

    /// Ask the transcoder to write a report file
    #[arg(long, env = "CAMRELAY_REPORT")]
    report: bool,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn")
    #[arg(long, default_value = "info", env = "CAMRELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long, env = "CAMRELAY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "camrelay_core={},camrelay_daemon={}",
        args.log_level, args.log_level
    );
    init_tracing(&log_filter, args.log_json);

    let project_dir = std::env::current_dir().ok();
    let mut config = camrelay_core::config::load_config(project_dir.as_deref())?;

    // CLI arguments take priority over config file and environment.
    if let Some(v) = args.poll_interval_ms {
        config.relay.poll_interval_ms = v;
    }
    if let Some(v) = args.idle_poll_limit {
        config.relay.idle_poll_limit = v;
    }
    if let Some(v) = args.analyzeduration {
        config.transcode.analyze_duration = v;
    }
    if let Some(v) = args.stop_timeout {
        config.transcode.stop_timeout_secs = v;
    }
    if let Some(bin) = args.ffmpeg_bin {
        config.transcode.ffmpeg_bin = bin;
    }
    if args.report {
        config.transcode.write_report = true;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        codec = %args.codec,
        stream_url = %args.stream_url,
        ffmpeg_bin = %config.transcode.ffmpeg_bin.display(),
        "Starting camrelay-daemon"
    );

    let camera = Arc::new(CameraStream::new(
        args.codec.as_str(),
        args.stream_url.as_str(),
    ));
    let relay = Arc::new(FrameRelay::new(
        Arc::clone(&camera.video_queue),
        Duration::from_millis(config.relay.poll_interval_ms),
        config.relay.idle_poll_limit,
    ));
    let transcoder = Arc::new(TranscodeManager::new(config.transcode.ffmpeg_bin.clone()));
    let pipeline = StreamPipeline::new(
        Arc::clone(&camera),
        relay,
        transcoder,
        Duration::from_secs(config.transcode.stop_timeout_secs),
        config.transcode.write_report,
    );

    // Frame producer: raw camera bytes arrive on stdin.
    let queue = Arc::clone(&camera.video_queue);
    let pump = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    info!("Frame input reached EOF");
                    break;
                }
                Ok(n) => queue.push(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    warn!(error = %e, "Frame input read failed");
                    break;
                }
            }
        }
    });

    let port = pipeline.start(config.transcode.analyze_duration).await?;
    info!(port, "Relay session live");

    // Notify systemd that the daemon is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        end = pipeline.join() => {
            info!(?end, "Relay session finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
            let end = pipeline.shutdown().await;
            info!(?end, "Relay session finished");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
            let end = pipeline.shutdown().await;
            info!(?end, "Relay session finished");
        }
    }

    pump.abort();
    info!("Daemon stopped");
    Ok(())
}
