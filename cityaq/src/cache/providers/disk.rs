//! Durable store keeping one file per entry.
//!
//! Entries live at `<directory>/<key>.bin`. Writes go to a temporary file in
//! the same directory first and are renamed into place, so a reader never
//! observes a partial entry and a crash leaves at most a stray temp file.
//! Nothing is ever evicted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::debug;

use crate::cache::traits::{BoxFuture, Cache, GcResult, ServiceCacheError};

const ENTRY_EXTENSION: &str = "bin";
const TEMP_MARKER: &str = ".tmp.";

/// On-disk cache provider.
pub struct DiskCacheProvider {
    directory: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskCacheProvider {
    /// Open (creating if needed) a store rooted at `directory`.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, ServiceCacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, ServiceCacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ServiceCacheError::InvalidKey(key.to_string()));
        }
        Ok(self.directory.join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.directory
            .join(format!("{key}{TEMP_MARKER}{}.{n}", std::process::id()))
    }
}

impl Cache for DiskCacheProvider {
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.entry_path(&key)?;
            let temp = self.temp_path(&key);
            fs::write(&temp, &value).await?;
            if let Err(e) = fs::rename(&temp, &path).await {
                let _ = fs::remove_file(&temp).await;
                return Err(e.into());
            }
            debug!(key = %key, bytes = value.len(), "Wrote cache entry");
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.entry_path(&key)?;
            match fs::read(&path).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.entry_path(&key)?;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn entry_count(&self) -> u64 {
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == ENTRY_EXTENSION)
            })
            .count() as u64
    }

    /// Removes temp files left behind by interrupted writes.
    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let mut removed = 0;
            let mut entries = fs::read_dir(&self.directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if name.to_string_lossy().contains(TEMP_MARKER) {
                    fs::remove_file(entry.path()).await?;
                    removed += 1;
                }
            }
            Ok(GcResult {
                entries_removed: removed,
                duration_ms: start.elapsed().as_millis() as u64,
            })
        })
    }
}
