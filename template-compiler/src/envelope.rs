//! The one error shape that leaves the compiler.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bundler::BuildFailure;
use crate::error::Error;
use crate::sandbox::RawError;
use crate::translate::SourceMapTranslator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub message: String,
    pub stack: Option<String>,
    pub name: String,
    #[serde(default)]
    pub cause: serde_json::Value,
}

impl ErrorObject {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            name: name.into(),
            cause: serde_json::Value::Null,
        }
    }

    pub fn with_cause(mut self, cause: serde_json::Value) -> Self {
        self.cause = cause;
        self
    }

    pub fn from_build_failure(failure: &BuildFailure) -> Self {
        let message = failure.message();
        Self {
            stack: Some(format!("BuildError: {}", message)),
            cause: json!({ "errors": failure.errors }),
            ..Self::new("BuildError", message)
        }
    }

    /// Collapse `error` into an `ErrorObject`. Runtime exceptions and
    /// missing exports go through `translator` when a bundle exists to
    /// map against.
    pub fn from_error(error: &Error, translator: Option<&SourceMapTranslator>) -> Self {
        match error {
            Error::Build(failure) => Self::from_build_failure(failure),
            Error::OverrideFetch {
                override_set_id,
                source,
            } => Self::new(error.kind(), error.to_string()).with_cause(json!({
                "overrideSetId": override_set_id,
                "reason": source.to_string(),
            })),
            Error::Timeout { stage, after } => {
                Self::new(error.kind(), error.to_string()).with_cause(json!({
                    "stage": stage.to_string(),
                    "timeoutMs": after.as_millis() as u64,
                }))
            }
            Error::MissingExport(_) => {
                let raw = RawError {
                    name: error.kind().to_string(),
                    message: error.to_string(),
                    stack: None,
                    cause: serde_json::Value::Null,
                };
                Self::from_raw(&raw, translator)
            }
            Error::Runtime(raw) => Self::from_raw(raw, translator),
            Error::Sandbox(_) | Error::System(_) | Error::Io(_) => {
                Self::new(error.kind(), error.to_string())
            }
        }
    }

    fn from_raw(raw: &RawError, translator: Option<&SourceMapTranslator>) -> Self {
        match translator {
            Some(translator) => translator.translate(raw),
            None => Self {
                stack: raw.stack.clone(),
                cause: raw.cause.clone(),
                ..Self::new(raw.name.clone(), raw.message.clone())
            },
        }
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for ErrorObject {}

/// `{ "error": ErrorObject }`, the failure half of every public result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorObject,
}

impl From<ErrorObject> for ErrorEnvelope {
    fn from(error: ErrorObject) -> Self {
        Self { error }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::bundler::{BuildLocation, BuildMessage};
    use crate::error::Stage;

    #[test]
    fn test_build_failure_envelope() {
        let failure = BuildFailure {
            errors: vec![BuildMessage {
                text: "Could not resolve \"./nope\"".into(),
                location: Some(BuildLocation {
                    file: "emails/a.jsx".into(),
                    line: 1,
                    column: 14,
                    line_text: "import x from './nope';".into(),
                }),
            }],
        };
        let object = ErrorObject::from_error(&Error::Build(failure), None);

        assert_eq!(object.name, "BuildError");
        assert_eq!(
            object.message,
            "Build failed with 1 error:\nemails/a.jsx:1:14: ERROR: Could not resolve \"./nope\""
        );
        assert_eq!(object.cause["errors"][0]["location"]["lineText"], "import x from './nope';");
    }

    #[test]
    fn test_timeout_envelope() {
        let error = Error::Timeout {
            stage: Stage::Execute,
            after: Duration::from_millis(250),
        };
        let object = ErrorObject::from_error(&error, None);
        assert_eq!(object.name, "TimeoutError");
        assert_eq!(object.message, "Timeout after 250ms during execution");
        assert_eq!(object.cause["timeoutMs"], 250);
    }

    #[test]
    fn test_missing_export_names_entry() {
        let error = Error::MissingExport(PathBuf::from("/work/app/emails/welcome.jsx"));
        let object = ErrorObject::from_error(&error, None);
        assert_eq!(object.name, "MissingExportError");
        assert!(object.message.contains("/work/app/emails/welcome.jsx"));
        assert!(object.stack.is_none());
    }

    #[test]
    fn test_envelope_serializes_absent_fields_as_null() {
        let envelope = ErrorEnvelope::from(ErrorObject::new("Error", "boom"));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({ "error": { "message": "boom", "stack": null, "name": "Error", "cause": null } })
        );
    }
}
