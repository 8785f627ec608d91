//! Isolated execution of bundled templates.
//!
//! Every execution gets a fresh QuickJS runtime and context. The context is
//! seeded from a [`CapabilityTable`], a `module` object with `default` and
//! `renderAsync` slots, `__filename`/`__dirname`, and a `require` that serves
//! the [`HostModuleTable`] before deferring to a [`FallbackLoader`]. The
//! bundle runs once, synchronously; afterwards the two slots are read back.

pub mod capabilities;
mod js;
pub mod modules;
mod template;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rquickjs::{CatchResultExt, Context, Ctx, Function, Object, Runtime, Undefined, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use capabilities::{Capability, CapabilityTable, ConsoleSink, Installer, SandboxHost};
pub use modules::{
    FallbackLoader, HostModule, HostModuleTable, RejectingLoader, ScriptModule,
    DEFAULT_HOST_MODULES,
};
pub use template::{CompiledTemplate, TemplateComponent};

use crate::error::{Error, Stage};
use crate::paths;

/// File name QuickJS gives evaluated scripts in stack traces.
const ENGINE_SCRIPT_NAME: &str = "eval_script";

/// Global holding this sandbox's instantiated host modules.
const HOST_MODULE_CACHE: &str = "__preview_host_modules";

/// An exception as thrown inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    /// JSON form of the error's own `cause`, `null` when it has none.
    #[serde(default)]
    pub cause: serde_json::Value,
}

/// Drop the loader and top-level frames the bundle adds around user code,
/// and name the entry file where the engine names its script.
pub fn trim_stack(stack: &str, entry: &Path) -> String {
    let entry = entry.to_string_lossy();
    stack
        .lines()
        .filter(|line| {
            let frame = line.trim_start();
            !(frame.starts_with("at __preview_")
                || frame.starts_with("at <eval>")
                || frame.contains("(native)"))
        })
        .map(|line| line.replace(ENGINE_SCRIPT_NAME, &entry))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One runtime and context plus the state its interrupt handler watches.
pub(crate) struct SandboxContext {
    context: Context,
    runtime: Runtime,
    deadline: Arc<Mutex<Option<Instant>>>,
    interrupted: Arc<AtomicBool>,
    console: ConsoleSink,
    entry: PathBuf,
}

impl SandboxContext {
    fn new(entry: &Path, console: ConsoleSink) -> Result<Self, Error> {
        let runtime = Runtime::new()
            .map_err(|e| Error::Sandbox(format!("Failed to create runtime: {}", e)))?;

        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let deadline = deadline.clone();
            let interrupted = interrupted.clone();
            runtime.set_interrupt_handler(Some(Box::new(move || {
                let expired = deadline
                    .lock()
                    .map(|d| d.map_or(false, |at| Instant::now() >= at))
                    .unwrap_or(false);
                if expired {
                    interrupted.store(true, Ordering::SeqCst);
                }
                expired
            })));
        }

        let context = Context::full(&runtime)
            .map_err(|e| Error::Sandbox(format!("Failed to create context: {}", e)))?;

        Ok(Self {
            context,
            runtime,
            deadline,
            interrupted,
            console,
            entry: entry.to_path_buf(),
        })
    }

    fn arm(&self, timeout: Duration) {
        self.interrupted.store(false, Ordering::SeqCst);
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = Some(Instant::now() + timeout);
        }
    }

    fn disarm(&self) {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = None;
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// The error for an exception that escaped template code.
    fn failure(&self, mut raw: RawError, stage: Stage, timeout: Duration) -> Error {
        if self.interrupted() {
            return Error::Timeout {
                stage,
                after: timeout,
            };
        }
        raw.stack = raw.stack.map(|stack| trim_stack(&stack, &self.entry));
        Error::Runtime(raw)
    }
}

pub struct SandboxExecutor {
    capabilities: Arc<CapabilityTable>,
    host_modules: Arc<HostModuleTable>,
    fallback: Arc<dyn FallbackLoader>,
    process_env: HashMap<String, String>,
    contexts_created: AtomicUsize,
}

impl SandboxExecutor {
    pub fn new() -> Self {
        Self {
            capabilities: Arc::new(CapabilityTable::standard()),
            host_modules: Arc::new(HostModuleTable::default()),
            fallback: Arc::new(RejectingLoader),
            process_env: HashMap::new(),
            contexts_created: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = Arc::new(capabilities);
        self
    }

    pub fn with_host_modules(mut self, host_modules: HostModuleTable) -> Self {
        self.host_modules = Arc::new(host_modules);
        self
    }

    pub fn with_fallback_loader(mut self, fallback: Arc<dyn FallbackLoader>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_process_env(mut self, env: HashMap<String, String>) -> Self {
        self.process_env = env;
        self
    }

    pub fn host_module_names(&self) -> Vec<String> {
        self.host_modules.names()
    }

    /// Number of sandbox contexts constructed so far.
    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    fn install_require<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let globals = ctx.globals();
        globals.set(HOST_MODULE_CACHE, Object::new(ctx.clone())?)?;

        let host_modules = self.host_modules.clone();
        let fallback = self.fallback.clone();
        let require = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, name: String| -> rquickjs::Result<Value<'js>> {
                let cache: Object<'js> = ctx.globals().get(HOST_MODULE_CACHE)?;
                let cached: Value<'js> = cache.get(name.as_str())?;
                if !cached.is_undefined() {
                    return Ok(cached);
                }
                let module = match host_modules.get(&name) {
                    Some(module) => module.instantiate(&ctx)?,
                    None => fallback.load(&ctx, &name)?,
                };
                cache.set(name.as_str(), module.clone())?;
                Ok(module)
            },
        )?;
        globals.set("require", require)?;
        Ok(())
    }

    fn prepare<'js>(&self, ctx: &Ctx<'js>, host: &SandboxHost) -> rquickjs::Result<()> {
        self.capabilities.install(ctx, host)?;
        self.install_require(ctx)?;

        let globals = ctx.globals();
        let exports = Object::new(ctx.clone())?;
        exports.set("default", Undefined)?;
        exports.set("renderAsync", Undefined)?;
        let module = Object::new(ctx.clone())?;
        module.set("exports", exports)?;
        globals.set("module", module)?;
        globals.set("__filename", host.entry.to_string_lossy().into_owned())?;
        globals.set(
            "__dirname",
            paths::parent_dir(&host.entry).to_string_lossy().into_owned(),
        )?;
        Ok(())
    }

    /// Run `code` once in a new sandbox and extract the template's exports.
    /// Blocks the calling thread until the script returns or `timeout` passes.
    pub fn execute(
        &self,
        code: &str,
        entry: &Path,
        timeout: Duration,
    ) -> Result<CompiledTemplate, Error> {
        let console = ConsoleSink::default();
        let sandbox = SandboxContext::new(entry, console.clone())?;
        let created = self.contexts_created.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Created sandbox context #{} for {}", created, entry.display());

        let host = SandboxHost {
            entry: entry.to_path_buf(),
            env: self.process_env.clone(),
            console,
        };

        sandbox.arm(timeout);
        let extracted = sandbox.context.with(|ctx| {
            self.prepare(&ctx, &host)
                .map_err(|e| Error::Sandbox(format!("Failed to prepare sandbox: {}", e)))?;

            if let Err(caught) = ctx.eval::<(), _>(code).catch(&ctx) {
                let raw = js::caught_error(&ctx, caught);
                return Err(sandbox.failure(raw, Stage::Execute, timeout));
            }

            let (component, render) = read_exports(&ctx)
                .map_err(|e| Error::Sandbox(format!("Failed to read exports: {}", e)))?;

            if component.is_undefined() {
                return Err(Error::MissingExport(entry.to_path_buf()));
            }
            let name = template::component_name(&component);
            let has_render = render.is_function();
            template::stash_exports(&ctx, component, render)
                .map_err(|e| Error::Sandbox(format!("Failed to keep exports: {}", e)))?;
            Ok((name, has_render))
        });
        sandbox.disarm();

        let (name, has_render) = extracted?;
        info!(
            "Executed {} (component: {}, render function: {})",
            entry.display(),
            name.as_deref().unwrap_or("anonymous"),
            has_render
        );
        Ok(CompiledTemplate::new(sandbox, name, has_render))
    }
}

/// The `default` and `renderAsync` slots of `module.exports`.
fn read_exports<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<(Value<'js>, Value<'js>)> {
    let module: Object<'js> = ctx.globals().get("module")?;
    let exports: Value<'js> = module.get("exports")?;
    match exports.as_object() {
        Some(exports) => Ok((exports.get("default")?, exports.get("renderAsync")?)),
        None => Ok((
            Value::new_undefined(ctx.clone()),
            Value::new_undefined(ctx.clone()),
        )),
    }
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new()
    }
}
