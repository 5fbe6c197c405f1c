//! Configuration resolution for camrelay.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/camrelay/settings.json)
//! 3. Project config (.camrelay/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete camrelay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

/// Relay forwarding-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Milliseconds between forwarding polls.
    pub poll_interval_ms: u64,
    /// Consecutive empty polls before the session ends.
    pub idle_poll_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            idle_poll_limit: 10,
        }
    }
}

/// Transcoder subprocess configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg binary.
    pub ffmpeg_bin: PathBuf,
    /// Microseconds of input analysis before demuxing starts.
    pub analyze_duration: u64,
    /// Seconds to wait for graceful shutdown before killing.
    pub stop_timeout_secs: u64,
    /// Ask the transcoder to write a report file.
    pub write_report: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            analyze_duration: 10_000_000, // microseconds
            stop_timeout_secs: 1,
            write_report: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".camrelay").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".camrelay").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/camrelay/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("camrelay").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.relay = overlay.relay;
    base.transcode = overlay.transcode;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("CAMRELAY_POLL_INTERVAL_MS") {
        if let Ok(n) = val.parse() {
            config.relay.poll_interval_ms = n;
        }
    }
    if let Ok(val) = std::env::var("CAMRELAY_IDLE_POLL_LIMIT") {
        if let Ok(n) = val.parse() {
            config.relay.idle_poll_limit = n;
        }
    }
    if let Ok(val) = std::env::var("CAMRELAY_FFMPEG_BIN") {
        config.transcode.ffmpeg_bin = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("CAMRELAY_ANALYZEDURATION") {
        if let Ok(n) = val.parse() {
            config.transcode.analyze_duration = n;
        }
    }
    if let Ok(val) = std::env::var("CAMRELAY_STOP_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.transcode.stop_timeout_secs = n;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_polls_every_500ms() {
        let config = Config::default();
        assert_eq!(config.relay.poll_interval_ms, 500);
    }

    #[test]
    fn default_config_ends_after_10_idle_polls() {
        let config = Config::default();
        assert_eq!(config.relay.idle_poll_limit, 10);
    }

    #[test]
    fn default_transcode_config() {
        let config = Config::default();
        assert_eq!(config.transcode.ffmpeg_bin, PathBuf::from("ffmpeg"));
        assert_eq!(config.transcode.stop_timeout_secs, 1);
        assert!(!config.transcode.write_report);
    }

    #[test]
    fn merge_overlay_wins() {
        let mut base = Config::default();
        let overlay = Config {
            relay: RelayConfig {
                poll_interval_ms: 100,
                idle_poll_limit: 3,
            },
            transcode: TranscodeConfig {
                ffmpeg_bin: PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
                ..TranscodeConfig::default()
            },
        };
        merge_config(&mut base, overlay);
        assert_eq!(base.relay.poll_interval_ms, 100);
        assert_eq!(base.relay.idle_poll_limit, 3);
        assert_eq!(base.transcode.ffmpeg_bin, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"relay": {"poll_interval_ms": 250, "idle_poll_limit": 4}}"#)
            .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.relay.poll_interval_ms, 250);
        assert_eq!(config.transcode.ffmpeg_bin, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(load_config_file(&path).is_err());
    }
}
