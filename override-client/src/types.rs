use serde::{Deserialize, Serialize};

/// One unpublished edit. The path is relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOverride {
    #[serde(rename = "path")]
    pub relative_path: String,
    pub content: String,
}

impl FileOverride {
    pub fn new(relative_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }
}

/// One entry of a batched query response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum BatchEntry {
    Result { result: ResultEnvelope },
    Error { error: ErrorEnvelope },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultEnvelope {
    pub data: DataEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataEnvelope {
    pub json: Vec<FileOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub json: ProcedureError,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProcedureError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}
