//! Durable index of locally available tracks
//!
//! A newline-delimited file of track ids, loaded once at startup and appended
//! to on every successful acquisition. Append-only during normal operation;
//! the in-memory set is the source of truth between writes.

use crate::error::Result;
use qplay_common::TrackId;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// Set of tracks known to be locally available, persisted to a flat file
pub struct AcquisitionIndex {
    path: PathBuf,
    tracks: RwLock<HashSet<TrackId>>,
}

impl AcquisitionIndex {
    /// Load the index from disk, creating an empty one on first run
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tracks: HashSet<TrackId> = if path.exists() {
            std::fs::read_to_string(&path)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(TrackId::from)
                .collect()
        } else {
            HashSet::new()
        };

        debug!("Loaded acquisition index: {} tracks", tracks.len());

        Ok(Self {
            path,
            tracks: RwLock::new(tracks),
        })
    }

    /// Whether a track is known to be locally available
    pub async fn contains(&self, track: &TrackId) -> bool {
        self.tracks.read().await.contains(track)
    }

    /// Record a track as locally available, appending it durably
    ///
    /// Inserting an already-known track is a no-op.
    pub async fn insert(&self, track: TrackId) -> Result<()> {
        let mut tracks = self.tracks.write().await;
        if tracks.contains(&track) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", track)?;

        tracks.insert(track);
        Ok(())
    }

    /// Number of indexed tracks
    pub async fn len(&self) -> usize {
        self.tracks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tracks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = AcquisitionIndex::load(dir.path().join("downloaded.txt")).unwrap();
        assert!(index.is_empty().await);
        assert!(!index.contains(&TrackId::from("a")).await);
    }

    #[tokio::test]
    async fn test_insert_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloaded.txt");

        let index = AcquisitionIndex::load(&path).unwrap();
        index.insert(TrackId::from("track-a")).await.unwrap();
        index.insert(TrackId::from("track-b")).await.unwrap();

        let reloaded = AcquisitionIndex::load(&path).unwrap();
        assert_eq!(reloaded.len().await, 2);
        assert!(reloaded.contains(&TrackId::from("track-a")).await);
        assert!(reloaded.contains(&TrackId::from("track-b")).await);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloaded.txt");

        let index = AcquisitionIndex::load(&path).unwrap();
        index.insert(TrackId::from("track-a")).await.unwrap();
        index.insert(TrackId::from("track-a")).await.unwrap();
        assert_eq!(index.len().await, 1);

        // No duplicate line was appended
        let reloaded = AcquisitionIndex::load(&path).unwrap();
        assert_eq!(reloaded.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloaded.txt");
        std::fs::write(&path, "track-a\n\ntrack-b\n").unwrap();

        let index = AcquisitionIndex::load(&path).unwrap();
        assert_eq!(index.len().await, 2);
    }
}
