use clap::Args;
use std::net::SocketAddr;
use std::time::Duration;
use template_compiler::{ClientConfig, CompilerConfig, OverrideFailurePolicy};

/// Command-line options for running the preview server.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    pub addr: SocketAddr,

    /// Maximum number of concurrent compiles
    #[arg(short, long, default_value = "10")]
    pub max_concurrent: usize,

    /// Deadline for bundling plus execution, in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Editing service that serves override sets
    #[arg(long, env = "PREVIEW_OVERRIDE_API")]
    pub override_api: Option<String>,

    /// Fail compiles whose override set cannot be fetched
    #[arg(long)]
    pub require_overrides: bool,

    /// Read every file from disk on every compile
    #[arg(long)]
    pub no_cache: bool,
}

impl ServeArgs {
    pub fn compiler_config(&self) -> CompilerConfig {
        let mut config = CompilerConfig::default()
            .with_max_concurrent_compiles(self.max_concurrent)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_cache_enabled(!self.no_cache);
        if let Some(api_url) = &self.override_api {
            config = config.with_override_api(ClientConfig::new(api_url.clone()));
        }
        if self.require_overrides {
            config = config.with_override_failure_policy(OverrideFailurePolicy::Fail);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_flags_reach_compiler_config() {
        let cli = Cli::try_parse_from([
            "preview-server",
            "--max-concurrent",
            "3",
            "--timeout",
            "2",
            "--require-overrides",
            "--no-cache",
        ])
        .unwrap();
        let config = cli.serve.compiler_config();

        assert_eq!(config.max_concurrent_compiles, 3);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.override_failure_policy, OverrideFailurePolicy::Fail);
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_defaults_keep_cache_and_fall_back() {
        let cli = Cli::try_parse_from(["preview-server"]).unwrap();
        let config = cli.serve.compiler_config();

        assert!(config.cache_enabled);
        assert_eq!(config.override_failure_policy, OverrideFailurePolicy::default());
    }
}
