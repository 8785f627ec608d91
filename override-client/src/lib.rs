//! # Override Client
//!
//! Fetches unpublished template edits ("override sets") from the editing service.
//! An override set is identified by a branch id and resolves to a list of
//! `{path, content}` pairs whose paths are relative to the template project root.
//!
//! ## Example
//!
//! ```rust,no_run
//! use override_client::{ClientConfig, OverrideClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OverrideClient::new(ClientConfig::new("http://localhost:4200"))?;
//!     let overrides = client.fetch_overrides("branch-id").await?;
//!
//!     for file in overrides {
//!         println!("{}", file.relative_path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Wire format
//!
//! The service exposes a batched query endpoint. The client issues a single
//! `GET {api_url}/trpc/{procedure}?batch=1&input=...` where `input` is the
//! JSON-encoded `{"0":{"json":{"branchId":"<id>"}}}` and reads the file list
//! from `[0].result.data.json`.
//!
//! ## Error Handling
//!
//! - HTTP transport failures and timeouts
//! - Non-success status codes
//! - Procedure errors reported inside the batch envelope
//! - Envelopes that do not match the expected shape

mod client;
mod config;
mod error;
mod types;

pub use client::OverrideClient;
pub use config::{ClientConfig, DEFAULT_API_URL, DEFAULT_PROCEDURE};
pub use error::Error;
pub use types::FileOverride;

/// Result type for override fetches
pub type Result<T> = std::result::Result<T, Error>;
