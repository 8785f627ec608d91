use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use override_client::OverrideClient;

use crate::{
    bundler::{Bundler, ContentCache},
    config::CompilerConfig,
    envelope::ErrorObject,
    error::{Error, Stage},
    paths,
    resolver::{OverrideSource, SourceResolver},
    sandbox::{CompiledTemplate, SandboxExecutor},
    sourcemap::RawSourceMap,
    translate::SourceMapTranslator,
    types::{ConsoleEntry, ModuleRequest, OverrideStatus, RenderOptions},
};

/// Compiles templates on demand. Cheap to clone; clones share the content
/// cache, the concurrency permits, and the executor's instrumentation.
#[derive(Clone)]
pub struct TemplateCompiler {
    config: Arc<CompilerConfig>,
    executor: Arc<SandboxExecutor>,
    semaphore: Arc<Semaphore>,
    cache: Arc<ContentCache>,
    overrides: Option<Arc<dyn OverrideSource>>,
}

impl TemplateCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self, Error> {
        let client = OverrideClient::new(config.override_api.clone())
            .map_err(|e| Error::System(format!("Failed to create override client: {}", e)))?;
        let executor = SandboxExecutor::new().with_process_env(config.process_env.clone());

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_compiles)),
            executor: Arc::new(executor),
            cache: Arc::new(ContentCache::new()),
            overrides: Some(Arc::new(client)),
            config: Arc::new(config),
        })
    }

    /// Replace where override sets are fetched from.
    pub fn with_override_source(mut self, source: Arc<dyn OverrideSource>) -> Self {
        self.overrides = Some(source);
        self
    }

    pub fn with_executor(mut self, executor: SandboxExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Sandbox contexts constructed by this compiler so far.
    pub fn contexts_created(&self) -> usize {
        self.executor.contexts_created()
    }

    pub fn get_available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Bundle `request.entry_path`, run it in a fresh sandbox, and extract
    /// its exports. Every failure comes back as an [`ErrorObject`] with
    /// positions in the author's files.
    pub async fn compile_and_execute(
        &self,
        request: ModuleRequest,
    ) -> Result<CompiledPreview, ErrorObject> {
        let id = Uuid::new_v4();
        let span = info_span!("compile", %id, entry = %request.entry_path.display());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: ModuleRequest) -> Result<CompiledPreview, ErrorObject> {
        let timeout = self.config.timeout;
        let started = Instant::now();

        // time spent waiting for a slot counts against the deadline
        let _permit = match tokio::time::timeout(timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(e)) => {
                let e = Error::System(format!("Failed to acquire compile permit: {}", e));
                return Err(ErrorObject::from_error(&e, None));
            }
            Err(_) => {
                let e = Error::Timeout {
                    stage: Stage::Bundle,
                    after: timeout,
                };
                warn!("No compile slot within {:?}", timeout);
                return Err(ErrorObject::from_error(&e, None));
            }
        };

        let entry = paths::absolute(&request.entry_path);

        let (resolver, artifact) = match tokio::time::timeout(
            timeout.saturating_sub(started.elapsed()),
            self.bundle(&entry, request.override_set_id.as_deref()),
        )
        .await
        {
            Ok(Ok(built)) => built,
            Ok(Err(e)) => {
                error!("Bundling failed: {}", e);
                return Err(ErrorObject::from_error(&e, None));
            }
            Err(_) => {
                let e = Error::Timeout {
                    stage: Stage::Bundle,
                    after: timeout,
                };
                error!("{}", e);
                return Err(ErrorObject::from_error(&e, None));
            }
        };

        let translator = SourceMapTranslator::new(
            &artifact.source_map,
            &artifact.source_map_path,
            &entry,
        );

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            let e = Error::Timeout {
                stage: Stage::Execute,
                after: timeout,
            };
            return Err(ErrorObject::from_error(&e, Some(&translator)));
        }

        let executor = self.executor.clone();
        let code = artifact.code;
        let execute_entry = entry.clone();
        let executed = tokio::task::spawn_blocking(move || {
            executor.execute(&code, &execute_entry, remaining)
        })
        .await
        .map_err(|e| Error::System(format!("Sandbox task failed: {}", e)))
        .and_then(|result| result);

        let template = match executed {
            Ok(template) => template,
            Err(e) => {
                error!("Execution failed: {}", e);
                return Err(ErrorObject::from_error(&e, Some(&translator)));
            }
        };

        info!(
            "Compiled {} in {:?} (overrides: {:?})",
            entry.display(),
            started.elapsed(),
            resolver.status()
        );
        Ok(CompiledPreview {
            component_name: template.component().name().map(str::to_string),
            has_render_function: template.has_render_function(),
            overrides: resolver.status().clone(),
            entry,
            timeout,
            translator,
            template: Arc::new(Mutex::new(template)),
        })
    }

    async fn bundle(
        &self,
        entry: &Path,
        override_set_id: Option<&str>,
    ) -> Result<(SourceResolver, crate::bundler::BuildArtifact), Error> {
        let resolver = SourceResolver::prepare(
            entry,
            override_set_id,
            self.overrides.as_deref(),
            self.config.override_failure_policy,
        )
        .await?;

        let mut bundler = Bundler::new(entry, &resolver, &self.config.bundle)
            .with_host_modules(self.executor.host_module_names());
        if self.config.cache_enabled {
            bundler = bundler.with_cache(&self.cache);
        }
        let artifact = bundler.bundle().await?;
        debug!("Bundle modules: {:?}", artifact.modules);
        Ok((resolver, artifact))
    }
}

/// A successfully executed template. The extracted component and render
/// function stay alive, bound to their sandbox, until this is dropped.
#[derive(Clone)]
pub struct CompiledPreview {
    component_name: Option<String>,
    has_render_function: bool,
    overrides: OverrideStatus,
    entry: PathBuf,
    timeout: Duration,
    translator: SourceMapTranslator,
    template: Arc<Mutex<CompiledTemplate>>,
}

impl std::fmt::Debug for CompiledPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPreview")
            .field("entry", &self.entry)
            .field("component_name", &self.component_name)
            .field("has_render_function", &self.has_render_function)
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl CompiledPreview {
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    pub fn has_render_function(&self) -> bool {
        self.has_render_function
    }

    /// The bundle's source map, rebased onto the project root.
    pub fn source_map(&self) -> &RawSourceMap {
        self.translator.source_map()
    }

    pub fn overrides(&self) -> &OverrideStatus {
        &self.overrides
    }

    pub fn console(&self) -> Vec<ConsoleEntry> {
        self.template
            .lock()
            .map(|template| template.console())
            .unwrap_or_default()
    }

    /// Render the extracted component with `props` on the blocking pool.
    pub async fn render(
        &self,
        props: serde_json::Value,
        options: RenderOptions,
    ) -> Result<String, ErrorObject> {
        let template = self.template.clone();
        let timeout = self.timeout;
        let rendered = tokio::task::spawn_blocking(move || {
            let template = template
                .lock()
                .map_err(|_| Error::System("Template lock poisoned".to_string()))?;
            template.render(&props, &options, timeout)
        })
        .await
        .map_err(|e| Error::System(format!("Render task failed: {}", e)))
        .and_then(|result| result);

        rendered.map_err(|e| {
            error!("Rendering failed: {}", e);
            ErrorObject::from_error(&e, Some(&self.translator))
        })
    }

    /// The serializable success payload, with `markup` when rendered.
    pub fn payload(&self, markup: Option<String>) -> PreviewPayload {
        PreviewPayload {
            component_name: self.component_name.clone(),
            has_render_function: self.has_render_function,
            source_map: self.source_map().clone(),
            overrides: self.overrides.clone(),
            console: self.console(),
            markup,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    pub component_name: Option<String>,
    pub has_render_function: bool,
    pub source_map: RawSourceMap,
    pub overrides: OverrideStatus,
    pub console: Vec<ConsoleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compile_limit() -> Result<(), Error> {
        let max_compiles = 2;
        let compiler =
            TemplateCompiler::new(CompilerConfig::default().with_max_concurrent_compiles(max_compiles))?;

        assert_eq!(compiler.get_available_slots(), max_compiles);
        assert_eq!(compiler.contexts_created(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_entry_is_build_error() -> Result<(), Error> {
        let compiler = TemplateCompiler::new(CompilerConfig::default())?;
        let error = compiler
            .compile_and_execute(ModuleRequest::new("/nonexistent/emails/missing.jsx"))
            .await
            .unwrap_err();

        assert_eq!(error.name, "BuildError");
        assert!(error.message.starts_with("Build failed with 1 error:"));
        assert_eq!(compiler.contexts_created(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_waiting_for_a_slot_counts_against_the_deadline() -> Result<(), Error> {
        let compiler = TemplateCompiler::new(
            CompilerConfig::default()
                .with_max_concurrent_compiles(1)
                .with_timeout(Duration::from_millis(100)),
        )?;
        let _held = compiler.semaphore.acquire().await.unwrap();

        let error = compiler
            .compile_and_execute(ModuleRequest::new("/nonexistent/emails/queued.jsx"))
            .await
            .unwrap_err();

        assert_eq!(error.name, "TimeoutError");
        assert_eq!(error.cause["stage"], "bundling");
        assert_eq!(compiler.contexts_created(), 0);
        Ok(())
    }
}
