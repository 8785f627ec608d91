use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::bundler::BuildFailure;
use crate::sandbox::RawError;

/// Pipeline stage a deadline expired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bundle,
    Execute,
    Render,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Bundle => write!(f, "bundling"),
            Stage::Execute => write!(f, "execution"),
            Stage::Render => write!(f, "rendering"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0.message())]
    Build(BuildFailure),

    #[error("Failed to fetch override set \"{override_set_id}\": {source}")]
    OverrideFetch {
        override_set_id: String,
        #[source]
        source: override_client::Error,
    },

    #[error("The template component at {} does not contain a default export", .0.display())]
    MissingExport(PathBuf),

    #[error("{}: {}", .0.name, .0.message)]
    Runtime(RawError),

    #[error("Timeout after {}ms during {stage}", .after.as_millis())]
    Timeout { stage: Stage, after: Duration },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("System error: {0}")]
    System(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The `name` an [`ErrorObject`](crate::ErrorObject) built from this error carries.
    pub fn kind(&self) -> &str {
        match self {
            Error::Build(_) => "BuildError",
            Error::OverrideFetch { .. } => "OverrideFetchError",
            Error::MissingExport(_) => "MissingExportError",
            Error::Runtime(raw) => &raw.name,
            Error::Timeout { .. } => "TimeoutError",
            Error::Sandbox(_) | Error::System(_) | Error::Io(_) => "Error",
        }
    }
}
