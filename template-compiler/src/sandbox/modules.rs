//! Modules a sandbox can `require` at run time.

use std::collections::BTreeMap;
use std::sync::Arc;

use rquickjs::{Ctx, Exception, Function, Object, Value};

/// Bare specifiers served by the default [`HostModuleTable`].
pub const DEFAULT_HOST_MODULES: &[&str] = &["react", "react/jsx-dev-runtime", "react/jsx-runtime"];

const REACT_SOURCE: &str = include_str!("../../runtime/react.js");
const JSX_RUNTIME_SOURCE: &str = include_str!("../../runtime/jsx-runtime.js");

/// A module implementation shared by every sandbox. Each sandbox
/// instantiates it at most once, on first `require`.
pub trait HostModule: Send + Sync {
    fn instantiate<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

/// A CommonJS module body with `module`, `exports`, and the sandbox's
/// `require` in scope.
#[derive(Debug, Clone)]
pub struct ScriptModule {
    source: &'static str,
}

impl ScriptModule {
    pub const fn new(source: &'static str) -> Self {
        Self { source }
    }
}

impl HostModule for ScriptModule {
    fn instantiate<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let factory: Function = ctx.eval(format!(
            "(function (module, exports) {{\n{}\n}})",
            self.source
        ))?;
        let module = Object::new(ctx.clone())?;
        module.set("exports", Object::new(ctx.clone())?)?;
        let exports: Value = module.get("exports")?;
        factory.call::<_, ()>((module.clone(), exports))?;
        module.get("exports")
    }
}

#[derive(Clone)]
pub struct HostModuleTable {
    modules: BTreeMap<String, Arc<dyn HostModule>>,
}

impl HostModuleTable {
    pub fn empty() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: impl Into<String>, module: Arc<dyn HostModule>) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn HostModule>> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

impl Default for HostModuleTable {
    fn default() -> Self {
        let react: Arc<dyn HostModule> = Arc::new(ScriptModule::new(REACT_SOURCE));
        let jsx_runtime: Arc<dyn HostModule> = Arc::new(ScriptModule::new(JSX_RUNTIME_SOURCE));
        Self::empty()
            .register("react", react)
            .register("react/jsx-runtime", jsx_runtime.clone())
            .register("react/jsx-dev-runtime", jsx_runtime)
    }
}

impl std::fmt::Debug for HostModuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

/// Consulted for every `require` the host module table does not serve.
pub trait FallbackLoader: Send + Sync {
    fn load<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Value<'js>>;
}

/// Rejects everything, the way Node reports a missing module.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingLoader;

impl FallbackLoader for RejectingLoader {
    fn load<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
        Err(Exception::throw_message(
            ctx,
            &format!("Cannot find module '{}'", name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_serves_react() {
        let table = HostModuleTable::default();
        assert_eq!(table.names(), DEFAULT_HOST_MODULES.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert!(Arc::ptr_eq(
            table.get("react/jsx-runtime").unwrap(),
            table.get("react/jsx-dev-runtime").unwrap()
        ));
        assert!(!table.contains("react-dom"));
    }
}
