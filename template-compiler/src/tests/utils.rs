pub mod defaults {
    use std::time::Duration;

    use crate::CompilerConfig;

    pub fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn short_timeout() -> Duration {
        Duration::from_millis(300)
    }

    pub fn test_config() -> CompilerConfig {
        CompilerConfig::default().with_timeout(default_timeout())
    }
}

pub mod project {
    use std::path::PathBuf;

    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    /// A template project on disk laid out as `<tmp>/app/emails/...`, so the
    /// project root of every entry is `<tmp>/app`.
    pub struct Project {
        dir: TempDir,
    }

    impl Project {
        pub fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        /// Write `contents` at `path`, relative to the project root.
        pub fn file(self, path: &str, contents: &str) -> Self {
            self.dir
                .child("app")
                .child(path)
                .write_str(contents)
                .unwrap();
            self
        }

        pub fn path(&self, path: &str) -> PathBuf {
            self.dir.child("app").child(path).path().to_path_buf()
        }

        pub fn root(&self) -> PathBuf {
            self.dir.child("app").path().to_path_buf()
        }
    }
}

pub mod overrides {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::{FileOverride, OverrideSource};

    /// Serves a fixed override list and counts fetches.
    #[derive(Default)]
    pub struct StaticOverrides {
        files: Vec<FileOverride>,
        fetches: AtomicUsize,
    }

    impl StaticOverrides {
        pub fn new(files: Vec<FileOverride>) -> Self {
            Self {
                files,
                fetches: AtomicUsize::new(0),
            }
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OverrideSource for StaticOverrides {
        async fn fetch(&self, _id: &str) -> override_client::Result<Vec<FileOverride>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        }
    }

    pub struct UnreachableOverrides;

    #[async_trait]
    impl OverrideSource for UnreachableOverrides {
        async fn fetch(&self, _id: &str) -> override_client::Result<Vec<FileOverride>> {
            Err(override_client::Error::Api {
                status_code: 502,
                message: "bad gateway".to_string(),
            })
        }
    }
}
