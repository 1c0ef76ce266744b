//! Local copies of generated images, served under `/cache` and swept hourly.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

pub const MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const SWEEP_EVERY: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` as `name` and returns the file name. `name` must be a plain file name.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> io::Result<String> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| *n == name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid cache file name"))?;

        // Write then rename so the sweeper and static server never see half a file.
        let tmp = self.dir.join(format!(".{}.part", file_name));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(file_name)).await?;
        Ok(file_name.to_string())
    }

    /// Deletes files older than `max_age`. Files that vanish mid-sweep are skipped.
    pub async fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot stat cached file");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "cached file already gone");
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to delete cached file"),
            }
        }

        Ok(removed)
    }
}

pub fn spawn_sweeper(cache: LocalCache, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(dir = %cache.dir().display(), "cache sweeper started");
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match cache.sweep(max_age).await {
                Ok(0) => {}
                Ok(n) => {
                    tracing::info!(removed = n, "swept stale cache files");
                    metrics::counter!("catkeeper_cache_files_swept_total").increment(n as u64);
                }
                Err(e) => tracing::error!(error = %e, "cache sweep failed"),
            }
        }
    })
}
