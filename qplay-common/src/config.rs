//! Configuration loading and cache folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Player configuration
///
/// Loaded from a TOML file; every field has a compiled default so a missing
/// or partial file is not an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root folder for acquired audio and the acquisition index
    pub cache_dir: PathBuf,

    /// External downloader argv template. `{track_id}` and `{cache_dir}`
    /// are substituted at invocation time; any other placeholder is passed
    /// through untouched (downloader-native templates stay intact).
    pub fetch_command: Vec<String>,

    /// Acquisition scheduler tick interval in milliseconds
    pub acquire_interval_ms: u64,

    /// Completion watcher tick interval in milliseconds
    pub watch_interval_ms: u64,

    /// Acquisition attempts per track before the head is skipped
    pub max_fetch_attempts: u32,

    /// Base delay between acquisition retries (doubled per attempt)
    pub fetch_backoff_ms: u64,

    /// Event bus buffer size
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            fetch_command: vec![
                "spotdl".to_string(),
                "https://open.spotify.com/track/{track_id}".to_string(),
                "--output".to_string(),
                "{cache_dir}/downloads/{track-id}".to_string(),
            ],
            acquire_interval_ms: 1000,
            watch_interval_ms: 500,
            max_fetch_attempts: 3,
            fetch_backoff_ms: 2000,
            event_capacity: 128,
        }
    }
}

impl Config {
    /// Load configuration following the priority order:
    /// 1. Explicit path (command-line argument)
    /// 2. `QPLAY_CONFIG` environment variable
    /// 3. Platform config dir (`~/.config/qplay/config.toml` on Linux)
    /// 4. Compiled defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("QPLAY_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Parse configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Where acquired audio files land
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// The durable acquisition index file
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join("downloaded.txt")
    }

    pub fn acquire_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_interval_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qplay").join("config.toml"))
}

/// OS-dependent default cache folder
fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qplay"))
        .unwrap_or_else(|| PathBuf::from("./qplay_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.acquire_interval_ms, 1000);
        assert_eq!(config.watch_interval_ms, 500);
        assert_eq!(config.max_fetch_attempts, 3);
        assert_eq!(config.index_path(), config.cache_dir.join("downloaded.txt"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acquire_interval_ms = 250").unwrap();
        writeln!(file, "cache_dir = \"/tmp/qplay-test\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.acquire_interval_ms, 250);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/qplay-test"));
        // Untouched fields fall back to defaults
        assert_eq!(config.watch_interval_ms, 500);
        assert_eq!(config.event_capacity, 128);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acquire_interval_ms = \"soon\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
