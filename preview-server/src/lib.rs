mod args;

pub use args::ServeArgs;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, path::PathBuf};
use template_compiler::{
    CompilerConfig, ErrorEnvelope, ErrorObject, ModuleRequest, PreviewPayload, RenderOptions,
    TemplateCompiler,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Compile error: {0}")]
    Compile(ErrorObject),
    #[error("Compiler error: {0}")]
    Compiler(#[from] template_compiler::Error),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Compile(error) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorEnvelope::from(error)),
            )
                .into_response(),
            ServerError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
            }
            ServerError::Compiler(_) | ServerError::ServerError(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub props: Option<serde_json::Value>,
    #[serde(default)]
    pub plain_text: bool,
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub entry_path: PathBuf,
    #[serde(default)]
    pub override_set_id: Option<String>,
    #[serde(default)]
    pub render: Option<RenderRequest>,
}

#[derive(Clone)]
pub struct AppState {
    compiler: TemplateCompiler,
}

pub fn create_app(config: CompilerConfig) -> Result<Router, ServerError> {
    let compiler = TemplateCompiler::new(config)?;
    Ok(app_with_compiler(compiler))
}

/// Router over an existing compiler.
pub fn app_with_compiler(compiler: TemplateCompiler) -> Router {
    let state = AppState { compiler };

    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(health_check))
        .route("/compile", post(compile))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting template preview server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn compile(
    State(state): State<AppState>,
    Json(payload): Json<CompileRequest>,
) -> Result<Json<PreviewPayload>, ServerError> {
    if payload.entry_path.as_os_str().is_empty() {
        return Err(ServerError::InvalidRequest("entryPath is empty".to_string()));
    }

    let mut request = ModuleRequest::new(payload.entry_path);
    request.override_set_id = payload.override_set_id;

    let preview = state
        .compiler
        .compile_and_execute(request)
        .await
        .map_err(ServerError::Compile)?;

    let markup = match payload.render {
        Some(render) => {
            let options = RenderOptions {
                pretty: render.pretty,
                plain_text: render.plain_text,
            };
            let props = render.props.unwrap_or_else(|| json!({}));
            Some(
                preview
                    .render(props, options)
                    .await
                    .map_err(ServerError::Compile)?,
            )
        }
        None => None,
    };

    Ok(Json(preview.payload(markup)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app() -> Router {
        create_app(CompilerConfig::default()).expect("Failed to create app")
    }

    fn project(entry: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let emails = dir.path().join("app").join("emails");
        fs::create_dir_all(&emails).unwrap();
        let path = emails.join("welcome.jsx");
        fs::write(&path, entry).unwrap();
        (dir, path)
    }

    async fn post_compile(app: Router, request: &CompileRequest) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/compile")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(request).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_compile_and_render() {
        let (_dir, entry) = project(
            "export default function Welcome({ name }) {\n  return <h1>{name}</h1>;\n}\n",
        );
        let request = CompileRequest {
            entry_path: entry,
            override_set_id: None,
            render: Some(RenderRequest {
                props: Some(json!({ "name": "Ada" })),
                ..RenderRequest::default()
            }),
        };

        let (status, body) = post_compile(test_app(), &request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["componentName"], "Welcome");
        assert_eq!(body["hasRenderFunction"], true);
        assert_eq!(body["overrides"]["status"], "notRequested");
        assert!(body["markup"].as_str().unwrap().ends_with("<h1>Ada</h1>"));
    }

    #[tokio::test]
    async fn test_compile_failure_is_an_envelope() {
        let (_dir, entry) = project("export default function Broken() { return null; }\nthrow new Error(\"boom\");\n");
        let request = CompileRequest {
            entry_path: entry,
            override_set_id: None,
            render: None,
        };

        let (status, body) = post_compile(test_app(), &request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["message"], "boom");
        assert_eq!(body["error"]["name"], "Error");
        assert!(body["error"]["stack"]
            .as_str()
            .unwrap()
            .contains("emails/welcome.jsx:2:"));
    }
}
