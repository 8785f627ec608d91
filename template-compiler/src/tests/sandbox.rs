use std::path::Path;
use std::sync::Arc;

use rquickjs::{Ctx, Object, Value};

use super::{
    fixtures::scripts::*,
    utils::defaults::{default_timeout, short_timeout},
};
use crate::sandbox::{Capability, CapabilityTable, FallbackLoader, HostModuleTable};
use crate::{Error, RenderOptions, Result, SandboxExecutor, Stage};

const ENTRY: &str = "/work/app/emails/welcome.jsx";

struct PadLoader;

impl FallbackLoader for PadLoader {
    fn load<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
        let module = Object::new(ctx.clone())?;
        module.set("name", name)?;
        Ok(module.into_value())
    }
}

#[test]
fn test_execute_extracts_named_default() -> Result<()> {
    let executor = SandboxExecutor::new();
    let template = executor.execute(NAMED_DEFAULT, Path::new(ENTRY), default_timeout())?;

    assert_eq!(template.component().name(), Some("Hello"));
    assert!(!template.has_render_function());
    assert_eq!(executor.contexts_created(), 1);
    Ok(())
}

#[test]
fn test_path_bindings_match_entry() -> Result<()> {
    let executor = SandboxExecutor::new();
    let template = executor.execute(PATH_BINDINGS, Path::new(ENTRY), default_timeout())?;

    let console = template.console();
    assert_eq!(console[0].message, format!("{} /work/app/emails", ENTRY));
    Ok(())
}

#[test]
fn test_unknown_modules_are_rejected() {
    let executor = SandboxExecutor::new();
    let error = executor
        .execute(REQUIRES_UNKNOWN, Path::new(ENTRY), default_timeout())
        .err()
        .unwrap();

    match error {
        Error::Runtime(raw) => assert_eq!(raw.message, "Cannot find module 'left-pad'"),
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn test_fallback_loader_serves_unknown_modules() -> Result<()> {
    let executor = SandboxExecutor::new().with_fallback_loader(Arc::new(PadLoader));
    let template = executor.execute(REQUIRES_UNKNOWN, Path::new(ENTRY), default_timeout())?;
    assert_eq!(template.component().name(), Some("Padded"));
    Ok(())
}

#[test]
fn test_host_modules_are_instantiated_once_per_context() -> Result<()> {
    let executor = SandboxExecutor::new();
    executor.execute(REQUIRES_REACT_TWICE, Path::new(ENTRY), default_timeout())?;

    let bare = SandboxExecutor::new().with_host_modules(HostModuleTable::empty());
    assert!(bare
        .execute(REQUIRES_REACT_TWICE, Path::new(ENTRY), default_timeout())
        .is_err());
    Ok(())
}

#[test]
fn test_capability_table_limits_globals() -> Result<()> {
    let executor = SandboxExecutor::new()
        .with_capabilities(CapabilityTable::standard().without("process"));
    let code = r#"
        if (typeof process !== "undefined") throw new Error("process leaked");
        if (typeof fetch !== "undefined") throw new Error("fetch leaked");
        if (typeof Buffer === "undefined") throw new Error("Buffer missing");
        module.exports.default = function Limited() { return null; };
    "#;
    executor.execute(code, Path::new(ENTRY), default_timeout())?;

    let custom = CapabilityTable::empty().with(Capability::library(
        "Headers",
        "web",
        include_str!("../../runtime/web.js"),
    ));
    assert_eq!(custom.names(), vec!["Headers"]);
    Ok(())
}

#[test]
fn test_thrown_strings_become_errors() {
    let executor = SandboxExecutor::new();
    let error = executor
        .execute(THROWS_STRING, Path::new(ENTRY), default_timeout())
        .err()
        .unwrap();

    assert_eq!(error.kind(), "Error");
    assert_eq!(error.to_string(), "Error: plain string");
}

#[test]
fn test_error_cause_keeps_name_and_message() {
    let executor = SandboxExecutor::new();
    let error = executor
        .execute(THROWS_WITH_ERROR_CAUSE, Path::new(ENTRY), default_timeout())
        .err()
        .unwrap();

    let Error::Runtime(raw) = error else {
        panic!("expected a runtime error, got {:?}", error);
    };
    assert_eq!(raw.message, "outer");
    assert_eq!(
        raw.cause,
        serde_json::json!({ "name": "TypeError", "message": "inner" })
    );
}

#[test]
fn test_infinite_loop_times_out() {
    let executor = SandboxExecutor::new();
    let error = executor
        .execute(INFINITE_LOOP, Path::new(ENTRY), short_timeout())
        .err()
        .unwrap();

    assert!(matches!(
        error,
        Error::Timeout {
            stage: Stage::Execute,
            ..
        }
    ));
}

#[test]
fn test_render_promise_that_never_settles() -> Result<()> {
    let executor = SandboxExecutor::new();
    let template = executor.execute(PENDING_RENDER, Path::new(ENTRY), default_timeout())?;
    assert!(template.has_render_function());

    let error = template
        .render(&serde_json::json!({}), &RenderOptions::default(), default_timeout())
        .err()
        .unwrap();
    match error {
        Error::Runtime(raw) => assert!(raw.message.contains("never settled")),
        other => panic!("expected a runtime error, got {:?}", other),
    }
    Ok(())
}
