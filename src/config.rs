use crate::error::{MediaChunkError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Limits imposed by the downstream embedding API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicingPolicy {
    /// Longest media accepted in one piece. 110 minutes leaves a
    /// 10-minute margin under the API's 120-minute ceiling.
    pub max_chunk_minutes: f64,
    /// Duplicated content on each side of a cut.
    pub overlap_seconds: f64,
}

impl Default for SlicingPolicy {
    fn default() -> Self {
        Self {
            max_chunk_minutes: 110.0,
            overlap_seconds: 5.0,
        }
    }
}

impl SlicingPolicy {
    pub fn max_chunk_seconds(&self) -> f64 {
        self.max_chunk_minutes * 60.0
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_chunk_minutes.is_finite() || self.max_chunk_minutes <= 0.0 {
            return Err(MediaChunkError::InvalidConfiguration(format!(
                "max_chunk_minutes must be positive, got {}",
                self.max_chunk_minutes
            )));
        }
        if !self.overlap_seconds.is_finite() || self.overlap_seconds < 0.0 {
            return Err(MediaChunkError::InvalidConfiguration(format!(
                "overlap_seconds must be zero or positive, got {}",
                self.overlap_seconds
            )));
        }
        if self.overlap_seconds >= self.max_chunk_seconds() {
            return Err(MediaChunkError::InvalidConfiguration(format!(
                "overlap_seconds ({}) must be smaller than the chunk limit ({}s)",
                self.overlap_seconds,
                self.max_chunk_seconds()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub probe_timeout_secs: u64,
    pub slicing: SlicingPolicy,
    pub database_url: Option<String>,
    pub url_cache_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            probe_timeout_secs: 30,
            slicing: SlicingPolicy::default(),
            database_url: None,
            url_cache_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    MediaChunkError::InvalidConfiguration(format!(
                        "{}: {e}",
                        config_path.display()
                    ))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(minutes) = std::env::var("MEDIACHUNK_MAX_CHUNK_MINUTES") {
            if let Ok(m) = minutes.parse() {
                self.slicing.max_chunk_minutes = m;
            }
        }
        if let Ok(overlap) = std::env::var("MEDIACHUNK_OVERLAP_SECONDS") {
            if let Ok(o) = overlap.parse() {
                self.slicing.overlap_seconds = o;
            }
        }
        if let Ok(timeout) = std::env::var("MEDIACHUNK_PROBE_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.probe_timeout_secs = t;
            }
        }
        if let Ok(path) = std::env::var("MEDIACHUNK_FFPROBE") {
            self.ffprobe_path = path;
        }
        if let Ok(path) = std::env::var("MEDIACHUNK_FFMPEG") {
            self.ffmpeg_path = path;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(MediaChunkError::InvalidConfiguration(
                "probe_timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.slicing.validate()
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mediachunk").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ffprobe_path, "ffprobe");
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.slicing.max_chunk_minutes, 110.0);
        assert_eq!(config.slicing.overlap_seconds, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_chunk_seconds() {
        assert_eq!(SlicingPolicy::default().max_chunk_seconds(), 6600.0);
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let mut policy = SlicingPolicy::default();
        policy.max_chunk_minutes = 0.0;
        assert!(policy.validate().is_err());

        let mut policy = SlicingPolicy::default();
        policy.overlap_seconds = -1.0;
        assert!(policy.validate().is_err());

        let policy = SlicingPolicy {
            max_chunk_minutes: 1.0,
            overlap_seconds: 60.0,
        };
        assert!(matches!(
            policy.validate(),
            Err(MediaChunkError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            probe_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

            [slicing]
            overlap_seconds = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.ffprobe_path, "ffprobe");
        assert_eq!(config.slicing.overlap_seconds, 2.5);
        assert_eq!(config.slicing.max_chunk_minutes, 110.0);
    }
}
