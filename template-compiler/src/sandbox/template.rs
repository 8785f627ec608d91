use std::time::Duration;

use rquickjs::{CatchResultExt, Ctx, Function, Object, Value};

use super::{js, RawError, SandboxContext};
use crate::error::{Error, Stage};
use crate::types::{ConsoleEntry, RenderOptions};

/// Global holding the extracted `component` and `render` exports.
const EXPORTS_SLOT: &str = "__preview_exports";

/// Global holding the settle state of the render in flight.
const RENDER_STATE_SLOT: &str = "__preview_render_state";

/// Subscribes to the render promise and records how it settles.
const SETTLE: &str = r#"(function (promise) {
  var state = { settled: false, failed: false };
  Promise.resolve(promise).then(
    function (value) { state.settled = true; state.value = String(value); },
    function (error) { state.settled = true; state.failed = true; state.error = error; }
  );
  return state;
})"#;

/// The template's default export.
#[derive(Debug, Clone)]
pub struct TemplateComponent {
    name: Option<String>,
}

impl TemplateComponent {
    /// `displayName` or function name, when the export is a named function.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Exports extracted from one execution, still bound to the sandbox that
/// produced them.
///
/// The export values themselves never leave the sandbox: they stay in a
/// private global of its context and are looked up again for each render,
/// so the template can move between threads with its runtime.
pub struct CompiledTemplate {
    component: TemplateComponent,
    has_render_function: bool,
    sandbox: SandboxContext,
}

const _: fn() = || {
    fn assert_send<T: Send>() {}
    assert_send::<CompiledTemplate>();
};

pub(crate) fn component_name(value: &Value<'_>) -> Option<String> {
    let object = value.as_object()?;
    if !value.is_function() {
        return None;
    }
    object
        .get::<_, Option<String>>("displayName")
        .ok()
        .flatten()
        .or_else(|| object.get::<_, Option<String>>("name").ok().flatten())
        .filter(|name| !name.is_empty() && !name.starts_with("__preview_"))
}

/// Keep the extracted exports in the context for later renders.
pub(crate) fn stash_exports<'js>(
    ctx: &Ctx<'js>,
    component: Value<'js>,
    render: Value<'js>,
) -> rquickjs::Result<()> {
    let exports = Object::new(ctx.clone())?;
    exports.set("component", component)?;
    exports.set("render", render)?;
    ctx.globals().set(EXPORTS_SLOT, exports)
}

impl CompiledTemplate {
    pub(crate) fn new(sandbox: SandboxContext, name: Option<String>, has_render: bool) -> Self {
        Self {
            component: TemplateComponent { name },
            has_render_function: has_render,
            sandbox,
        }
    }

    pub fn component(&self) -> &TemplateComponent {
        &self.component
    }

    /// Whether the template exports a `renderAsync` function.
    pub fn has_render_function(&self) -> bool {
        self.has_render_function
    }

    /// Console output produced by the template so far.
    pub fn console(&self) -> Vec<ConsoleEntry> {
        self.sandbox.console.entries()
    }

    /// Render the component with `props` through the extracted render
    /// function, running queued jobs until its promise settles.
    pub fn render(
        &self,
        props: &serde_json::Value,
        options: &RenderOptions,
        timeout: Duration,
    ) -> Result<String, Error> {
        if !self.has_render_function {
            return Err(Error::Sandbox(
                "The template does not export a render function".into(),
            ));
        }
        let props = serde_json::to_string(props)
            .map_err(|e| Error::Sandbox(format!("Invalid props: {}", e)))?;
        let options = serde_json::to_string(options)
            .map_err(|e| Error::Sandbox(format!("Invalid render options: {}", e)))?;

        self.sandbox.arm(timeout);
        let started = self.sandbox.context.with(|ctx| {
            start_render(&ctx, &props, &options)
                .catch(&ctx)
                .map_err(|caught| js::caught_error(&ctx, caught))
        });
        if let Err(raw) = started {
            self.sandbox.disarm();
            return Err(self.sandbox.failure(raw, Stage::Render, timeout));
        }

        loop {
            match self.sandbox.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                // a failing job rejects its promise; the state object sees it
                Err(_) if !self.sandbox.interrupted() => continue,
                Err(_) => break,
            }
        }
        self.sandbox.disarm();

        if self.sandbox.interrupted() {
            return Err(Error::Timeout {
                stage: Stage::Render,
                after: timeout,
            });
        }

        let settled = self
            .sandbox
            .context
            .with(|ctx| read_settled(&ctx))
            .map_err(|e| Error::Sandbox(format!("Failed to read render result: {}", e)))?;

        settled.map_err(|raw| self.sandbox.failure(raw, Stage::Render, timeout))
    }
}

fn start_render(ctx: &Ctx<'_>, props: &str, options: &str) -> rquickjs::Result<()> {
    let exports: Object = ctx.globals().get(EXPORTS_SLOT)?;
    let component: Value = exports.get("component")?;
    let render: Function = exports.get("render")?;
    let props = js::json_parse(ctx, props)?;
    let options = js::json_parse(ctx, options)?;

    let require: Function = ctx.globals().get("require")?;
    let react: Object = require.call(("react",))?;
    let create_element: Function = react.get("createElement")?;
    let element: Value = create_element.call((component, props))?;

    let promise: Value = render.call((element, options))?;
    let settle: Function = ctx.eval(SETTLE)?;
    let state: Object = settle.call((promise,))?;
    ctx.globals().set(RENDER_STATE_SLOT, state)
}

fn read_settled(ctx: &Ctx<'_>) -> rquickjs::Result<Result<String, RawError>> {
    let state: Object = ctx.globals().get(RENDER_STATE_SLOT)?;
    ctx.globals().remove(RENDER_STATE_SLOT)?;
    if !state.get::<_, bool>("settled")? {
        return Ok(Err(RawError {
            name: "Error".to_string(),
            message: "The render function returned a promise that never settled".to_string(),
            stack: None,
            cause: serde_json::Value::Null,
        }));
    }
    if state.get::<_, bool>("failed")? {
        let error: Value = state.get("error")?;
        return Ok(Err(js::raw_error(ctx, error)));
    }
    Ok(Ok(state.get("value")?))
}
