//! Track acquisition service
//!
//! `TrackFetcher` is the seam to the remote acquisition service; the stock
//! implementation shells out to an external downloader (spotdl by default)
//! and verifies that the expected file landed in the cache.

use crate::error::{Error, Result};
use async_trait::async_trait;
use qplay_common::{config::Config, TrackId};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Guarantees a track's audio resource exists locally, or fails
///
/// May be slow (network + conversion). Must be idempotent: calling it for an
/// already-available track returns quickly with the existing path.
#[async_trait]
pub trait TrackFetcher: Send + Sync {
    async fn ensure_available(&self, track: &TrackId) -> Result<PathBuf>;
}

/// Fetcher that runs a configured downloader command per track
///
/// The argv template substitutes `{track_id}` and `{cache_dir}`; other
/// placeholders (e.g. the downloader's own output templates) pass through
/// untouched. Success requires both a zero exit status and the expected
/// output file on disk.
pub struct CommandFetcher {
    argv: Vec<String>,
    downloads_dir: PathBuf,
}

impl CommandFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            argv: config.fetch_command.clone(),
            downloads_dir: config.downloads_dir(),
        }
    }

    /// Expected on-disk location for a track's audio
    pub fn track_path(&self, track: &TrackId) -> PathBuf {
        self.downloads_dir.join(format!("{}.mp3", track))
    }

    fn render_argv(&self, track: &TrackId) -> Vec<String> {
        let cache_dir = self
            .downloads_dir
            .parent()
            .unwrap_or(&self.downloads_dir)
            .to_string_lossy()
            .to_string();

        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{track_id}", track.as_str())
                    .replace("{cache_dir}", &cache_dir)
            })
            .collect()
    }
}

#[async_trait]
impl TrackFetcher for CommandFetcher {
    async fn ensure_available(&self, track: &TrackId) -> Result<PathBuf> {
        let path = self.track_path(track);
        if path.exists() {
            debug!("Track {} already on disk", track);
            return Ok(path);
        }

        let argv = self.render_argv(track);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config("fetch_command is empty".to_string()))?;

        std::fs::create_dir_all(&self.downloads_dir)?;

        info!("Fetching track {} via {}", track, program);
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Acquisition(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Acquisition(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        if !path.exists() {
            return Err(Error::Acquisition(format!(
                "{} reported success but {} is missing",
                program,
                path.display()
            )));
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher_with(command: &[&str], cache_dir: &std::path::Path) -> CommandFetcher {
        let mut config = Config::default();
        config.fetch_command = command.iter().map(|s| s.to_string()).collect();
        config.cache_dir = cache_dir.to_path_buf();
        CommandFetcher::new(&config)
    }

    #[test]
    fn test_argv_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            &["dl", "https://example.com/{track_id}", "-o", "{cache_dir}/downloads"],
            dir.path(),
        );

        let argv = fetcher.render_argv(&TrackId::from("abc123"));
        assert_eq!(argv[0], "dl");
        assert_eq!(argv[1], "https://example.com/abc123");
        assert_eq!(
            argv[3],
            format!("{}/downloads", dir.path().to_string_lossy())
        );
    }

    #[test]
    fn test_unknown_placeholders_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(&["dl", "{cache_dir}/downloads/{track-id}"], dir.path());

        let argv = fetcher.render_argv(&TrackId::from("abc"));
        // "{track-id}" is the downloader's own template, not ours
        assert!(argv[1].ends_with("/downloads/{track-id}"));
    }

    #[tokio::test]
    async fn test_existing_file_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        // A command that would fail if it ever ran
        let fetcher = fetcher_with(&["/nonexistent-downloader"], dir.path());

        let track = TrackId::from("already-here");
        std::fs::create_dir_all(fetcher.downloads_dir.clone()).unwrap();
        std::fs::write(fetcher.track_path(&track), b"audio").unwrap();

        let path = fetcher.ensure_available(&track).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(&["/nonexistent-downloader", "{track_id}"], dir.path());

        let err = fetcher
            .ensure_available(&TrackId::from("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_success_without_output_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // `true` exits 0 but produces nothing
        let fetcher = fetcher_with(&["true", "{track_id}"], dir.path());

        let err = fetcher
            .ensure_available(&TrackId::from("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
    }
}
