use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{MediaChunkError, Result};

/// Default bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Check if FFmpeg is installed and accessible.
pub async fn check_ffmpeg(ffmpeg: &str) -> Result<()> {
    check_tool(ffmpeg, "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH").await
}

/// Check if FFprobe is installed and accessible.
pub async fn check_ffprobe(ffprobe: &str) -> Result<()> {
    check_tool(ffprobe, "FFprobe not found. Please install FFmpeg (includes FFprobe)").await
}

async fn check_tool(program: &str, hint: &str) -> Result<()> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| MediaChunkError::InvalidConfiguration(format!("{hint}. Error: {e}")))?;

    if !output.status.success() {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "{program} -version exited with {}",
            output.status
        )));
    }

    debug!("{} is available", program);
    Ok(())
}

/// Reads media durations with an external probe tool.
#[derive(Debug, Clone)]
pub struct Prober {
    program: String,
    timeout: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new("ffprobe", DEFAULT_PROBE_TIMEOUT)
    }
}

impl Prober {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ffprobe_path.clone(), config.probe_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get media duration in seconds.
    ///
    /// The child process is killed if it outlives the deadline. Failures are
    /// never retried.
    pub async fn duration(&self, input: &Path) -> Result<f64> {
        if !input.exists() {
            return Err(MediaChunkError::FileNotFound(input.display().to_string()));
        }

        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output.map_err(|e| {
                MediaChunkError::ProbeError(format!("Failed to run {}: {e}", self.program))
            })?,
            Err(_) => {
                return Err(MediaChunkError::ProbeTimeout {
                    path: input.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaChunkError::ProbeError(format!(
                "{} failed on {}: {}",
                self.program,
                input.display(),
                stderr.trim()
            )));
        }

        let duration = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Probed {}: {:.3}s", input.display(), duration);
        Ok(duration)
    }
}

/// Get media duration using the default `ffprobe` binary.
pub async fn probe_duration(input: &Path, timeout: Duration) -> Result<f64> {
    Prober::new("ffprobe", timeout).duration(input).await
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    if text.is_empty() {
        return Err(MediaChunkError::ProbeError(
            "probe returned no duration".to_string(),
        ));
    }

    let secs: f64 = text.parse().map_err(|e| {
        MediaChunkError::ProbeError(format!("Failed to parse duration '{text}': {e}"))
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(MediaChunkError::ProbeError(format!(
            "probe returned unusable duration '{text}'"
        )));
    }

    Ok(secs)
}
