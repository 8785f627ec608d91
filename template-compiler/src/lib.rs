//! # Template Compiler
//!
//! Compiles a preview template on demand: the entry's import graph is
//! bundled into one CommonJS script, executed once in a fresh QuickJS
//! sandbox, and the exported component and render function are handed
//! back. Unpublished edits from the editing service take precedence over
//! disk content, and every failure is reported as an [`ErrorObject`] whose
//! stack points at the author's own files.

pub mod bundler;
mod config;
mod envelope;
mod error;
pub mod paths;
mod resolver;
pub mod sandbox;
mod service;
pub mod sourcemap;
mod translate;
mod types;

pub use bundler::{BuildArtifact, BuildFailure, BuildLocation, BuildMessage, BundleOptions, Bundler};
pub use config::{CompilerConfig, DEFAULT_MAX_CONCURRENT_COMPILES, DEFAULT_TIMEOUT};
pub use envelope::{ErrorEnvelope, ErrorObject};
pub use error::{Error, Stage};
pub use resolver::{OverrideSource, SourceResolver};
pub use sandbox::{CompiledTemplate, RawError, SandboxExecutor};
pub use service::{CompiledPreview, PreviewPayload, TemplateCompiler};
pub use translate::{SourceMapTranslator, StackFrame};
pub use types::{
    ConsoleEntry, ConsoleLevel, ModuleRequest, OverrideFailurePolicy, OverrideStatus,
    RenderOptions,
};

pub use override_client::{ClientConfig, FileOverride};

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests;
