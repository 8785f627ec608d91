use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:4200";
pub const DEFAULT_PROCEDURE: &str = "editor.getPublishedFiles";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the editing service
    pub api_url: String,

    /// Batched query procedure that lists the unpublished files of a branch
    pub procedure: String,

    /// Request timeout for the single fetch
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = procedure.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            procedure: DEFAULT_PROCEDURE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}
