use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::debug;

#[derive(Debug, Clone)]
struct CachedFile {
    modified: Option<SystemTime>,
    len: u64,
    content: Arc<str>,
}

/// Path-keyed file contents shared across compiles. An entry is served only
/// while the file's modification time and length are unchanged.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: RwLock<HashMap<PathBuf, CachedFile>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Arc<str>> {
        let metadata = tokio::fs::metadata(path).await?;
        let modified = metadata.modified().ok();
        let len = metadata.len();

        let cached = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(path).cloned());
        if let Some(file) = cached {
            if file.modified == modified && file.len == len {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(file.content);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let content: Arc<str> = tokio::fs::read_to_string(path).await?.into();
        debug!("Cached {} ({} bytes)", path.display(), len);

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                path.to_path_buf(),
                CachedFile {
                    modified,
                    len,
                    content: content.clone(),
                },
            );
        }
        Ok(content)
    }

    pub fn invalidate(&self, path: &Path) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(path);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cache_hits_until_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsx");
        std::fs::write(&path, "export default 1;").unwrap();

        let cache = ContentCache::new();
        assert_eq!(&*cache.read(&path).await.unwrap(), "export default 1;");
        assert_eq!(&*cache.read(&path).await.unwrap(), "export default 1;");
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);

        // a length change invalidates even when the mtime resolution is coarse
        std::fs::write(&path, "export default 12345;").unwrap();
        assert_eq!(&*cache.read(&path).await.unwrap(), "export default 12345;");
        assert_eq!(cache.stats().misses, 2);

        cache.invalidate(&path);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let cache = ContentCache::new();
        assert!(cache.read(Path::new("/definitely/not/here.jsx")).await.is_err());
    }
}
