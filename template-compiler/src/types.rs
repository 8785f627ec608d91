use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One compile request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRequest {
    /// Template entry file
    pub entry_path: PathBuf,
    /// Set of unpublished edits to prefer over disk content
    #[serde(default)]
    pub override_set_id: Option<String>,
}

impl ModuleRequest {
    pub fn new(entry_path: impl Into<PathBuf>) -> Self {
        Self {
            entry_path: entry_path.into(),
            override_set_id: None,
        }
    }

    pub fn with_override_set(mut self, override_set_id: impl Into<String>) -> Self {
        self.override_set_id = Some(override_set_id.into());
        self
    }
}

/// Whether unpublished edits were applied to a compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OverrideStatus {
    /// No override set was requested; every file came from disk.
    NotRequested,
    /// The override set was fetched; `count` files are overridden.
    Applied { count: usize },
    /// The fetch failed and the compile fell back to disk. The result may be stale.
    Unavailable { reason: String },
}

/// What to do when the override set cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideFailurePolicy {
    #[default]
    FallBackToDisk,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Debug,
    Warn,
    Error,
}

/// A console call made by template code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Options handed to the extracted render function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default)]
    pub pretty: bool,
    #[serde(default)]
    pub plain_text: bool,
}

impl RenderOptions {
    pub fn plain_text() -> Self {
        Self {
            plain_text: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: ModuleRequest =
            serde_json::from_str(r#"{"entryPath": "/p/emails/welcome.jsx", "overrideSetId": "b1"}"#)
                .unwrap();
        assert_eq!(
            request,
            ModuleRequest::new("/p/emails/welcome.jsx").with_override_set("b1")
        );
    }

    #[test]
    fn test_override_status_serialization() {
        let json = serde_json::to_value(OverrideStatus::Applied { count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "applied", "count": 2}));
        let json = serde_json::to_value(OverrideStatus::NotRequested).unwrap();
        assert_eq!(json, serde_json::json!({"status": "notRequested"}));
    }
}
