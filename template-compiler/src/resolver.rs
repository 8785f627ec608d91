//! File content for one compile: unpublished edits first, disk second.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use override_client::{FileOverride, OverrideClient};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::paths;
use crate::types::{OverrideFailurePolicy, OverrideStatus};

/// Anything that can list the files of an override set.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    async fn fetch(&self, override_set_id: &str) -> override_client::Result<Vec<FileOverride>>;
}

#[async_trait]
impl OverrideSource for OverrideClient {
    async fn fetch(&self, override_set_id: &str) -> override_client::Result<Vec<FileOverride>> {
        self.fetch_overrides(override_set_id).await
    }
}

#[derive(Debug, Clone)]
pub struct SourceResolver {
    project_root: PathBuf,
    overrides: HashMap<String, String>,
    status: OverrideStatus,
}

impl SourceResolver {
    /// A resolver that reads everything from disk.
    pub fn disk_only(entry: &Path) -> Self {
        Self {
            project_root: paths::project_root(&paths::absolute(entry)),
            overrides: HashMap::new(),
            status: OverrideStatus::NotRequested,
        }
    }

    /// A resolver over an already fetched override list. Later entries for
    /// the same path replace earlier ones.
    pub fn with_overrides(entry: &Path, overrides: Vec<FileOverride>) -> Self {
        let mut resolver = Self::disk_only(entry);
        for file in overrides {
            resolver
                .overrides
                .insert(paths::normalize_relative(&file.relative_path), file.content);
        }
        resolver.status = OverrideStatus::Applied {
            count: resolver.overrides.len(),
        };
        resolver
    }

    /// Fetch the override set, if any, before a single file is read.
    pub async fn prepare(
        entry: &Path,
        override_set_id: Option<&str>,
        source: Option<&dyn OverrideSource>,
        policy: OverrideFailurePolicy,
    ) -> Result<Self, Error> {
        let Some(override_set_id) = override_set_id else {
            return Ok(Self::disk_only(entry));
        };
        let Some(source) = source else {
            warn!("Override set {} requested without an override source", override_set_id);
            let mut resolver = Self::disk_only(entry);
            resolver.status = OverrideStatus::Unavailable {
                reason: "no override source configured".to_string(),
            };
            return Ok(resolver);
        };

        debug!("Fetching override set {}", override_set_id);
        match source.fetch(override_set_id).await {
            Ok(files) => {
                let resolver = Self::with_overrides(entry, files);
                info!(
                    "Applied override set {} ({:?})",
                    override_set_id, resolver.status
                );
                Ok(resolver)
            }
            Err(e) => match policy {
                OverrideFailurePolicy::Fail => Err(Error::OverrideFetch {
                    override_set_id: override_set_id.to_string(),
                    source: e,
                }),
                OverrideFailurePolicy::FallBackToDisk => {
                    warn!(
                        "Override set {} unavailable, reading from disk: {}",
                        override_set_id, e
                    );
                    let mut resolver = Self::disk_only(entry);
                    resolver.status = OverrideStatus::Unavailable {
                        reason: e.to_string(),
                    };
                    Ok(resolver)
                }
            },
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn status(&self) -> &OverrideStatus {
        &self.status
    }

    /// Whether any read may be served from override content. Content is only
    /// cacheable across compiles when this is false.
    pub fn overrides_active(&self) -> bool {
        matches!(self.status, OverrideStatus::Applied { .. })
    }

    pub fn override_for(&self, path: &Path) -> Option<&str> {
        if self.overrides.is_empty() {
            return None;
        }
        let relative = paths::relative_to(&self.project_root, path)?;
        self.overrides
            .get(&paths::normalize_relative(&relative))
            .map(String::as_str)
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<String> {
        if let Some(content) = self.override_for(path) {
            debug!("Serving {} from overrides", path.display());
            return Ok(content.to_string());
        }
        tokio::fs::read_to_string(path).await
    }

    /// True for regular files on disk and for paths that only exist as overrides.
    pub async fn exists(&self, path: &Path) -> bool {
        if self.override_for(path).is_some() {
            return true;
        }
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StaticSource {
        files: Vec<FileOverride>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OverrideSource for StaticSource {
        async fn fetch(&self, _id: &str) -> override_client::Result<Vec<FileOverride>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl OverrideSource for FailingSource {
        async fn fetch(&self, _id: &str) -> override_client::Result<Vec<FileOverride>> {
            Err(override_client::Error::Api {
                status_code: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    fn project() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let emails = dir.path().join("app").join("emails");
        std::fs::create_dir_all(&emails).unwrap();
        std::fs::write(emails.join("welcome.jsx"), "disk").unwrap();
        std::fs::write(emails.join("footer.jsx"), "disk footer").unwrap();
        (dir, emails.join("welcome.jsx"))
    }

    #[tokio::test]
    async fn test_overrides_win_over_disk() {
        let (_dir, entry) = project();
        let source = StaticSource {
            files: vec![
                FileOverride::new("emails/welcome.jsx", "edited"),
                FileOverride::new("./emails/footer.jsx", ""),
                FileOverride::new("emails/new.jsx", "only remote"),
            ],
            calls: AtomicUsize::new(0),
        };

        let resolver = SourceResolver::prepare(
            &entry,
            Some("branch"),
            Some(&source),
            OverrideFailurePolicy::Fail,
        )
        .await
        .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.status(), &OverrideStatus::Applied { count: 3 });
        assert!(resolver.overrides_active());

        let emails = entry.parent().unwrap();
        assert_eq!(resolver.read(&entry).await.unwrap(), "edited");
        // an empty override is still an override
        assert_eq!(resolver.read(&emails.join("footer.jsx")).await.unwrap(), "");
        assert!(resolver.exists(&emails.join("new.jsx")).await);
        assert!(!resolver.exists(&emails.join("missing.jsx")).await);
    }

    #[tokio::test]
    async fn test_later_duplicate_override_wins() {
        let (_dir, entry) = project();
        let resolver = SourceResolver::with_overrides(
            &entry,
            vec![
                FileOverride::new("emails/welcome.jsx", "first"),
                FileOverride::new("emails/welcome.jsx", "second"),
            ],
        );
        assert_eq!(resolver.read(&entry).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_fetch_failure_follows_policy() {
        let (_dir, entry) = project();

        let resolver = SourceResolver::prepare(
            &entry,
            Some("branch"),
            Some(&FailingSource),
            OverrideFailurePolicy::FallBackToDisk,
        )
        .await
        .unwrap();
        assert!(matches!(resolver.status(), OverrideStatus::Unavailable { .. }));
        assert!(!resolver.overrides_active());
        assert_eq!(resolver.read(&entry).await.unwrap(), "disk");

        let err = SourceResolver::prepare(
            &entry,
            Some("branch"),
            Some(&FailingSource),
            OverrideFailurePolicy::Fail,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::OverrideFetch { .. }));
    }

    #[tokio::test]
    async fn test_no_override_set_reads_disk() {
        let (_dir, entry) = project();
        let resolver = SourceResolver::prepare(&entry, None, None, OverrideFailurePolicy::Fail)
            .await
            .unwrap();
        assert_eq!(resolver.status(), &OverrideStatus::NotRequested);
        assert_eq!(resolver.read(&entry).await.unwrap(), "disk");
    }
}
