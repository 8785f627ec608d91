//! Small conversions between engine values and Rust data.

use rquickjs::{CaughtError, Ctx, Function, Object, Value};

use super::RawError;

fn global_function<'js>(ctx: &Ctx<'js>, path: &[&str]) -> rquickjs::Result<Function<'js>> {
    let mut object: Object<'js> = ctx.globals();
    for segment in &path[..path.len() - 1] {
        object = object.get(*segment)?;
    }
    object.get(path[path.len() - 1])
}

/// `String(value)`, the way the engine itself would print it.
pub fn coerce_string<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> String {
    global_function(ctx, &["String"])
        .and_then(|string| string.call::<_, String>((value,)))
        .unwrap_or_else(|_| "[unprintable value]".to_string())
}

pub fn json_stringify<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Option<String> {
    global_function(ctx, &["JSON", "stringify"])
        .and_then(|stringify| stringify.call::<_, Option<String>>((value,)))
        .ok()
        .flatten()
}

pub fn json_parse<'js>(ctx: &Ctx<'js>, text: &str) -> rquickjs::Result<Value<'js>> {
    global_function(ctx, &["JSON", "parse"])?.call((text,))
}

/// Console rendering of one argument.
pub fn display<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> String {
    if let Some(string) = value.as_string() {
        return string.to_string().unwrap_or_default();
    }
    if let Some(object) = value.as_object() {
        if !value.is_function() {
            if let Ok(Some(stack)) = object.get::<_, Option<String>>("stack") {
                return format!("{}\n{}", coerce_string(ctx, value.clone()), stack.trim_end());
            }
            if let Some(json) = json_stringify(ctx, value.clone()) {
                return json;
            }
        }
    }
    coerce_string(ctx, value)
}

/// Name, message, and stack of a thrown value. Values that are not
/// error-shaped become an `Error` carrying their string form.
pub fn raw_error<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> RawError {
    if let Some(object) = value.as_object() {
        if let Ok(Some(message)) = object.get::<_, Option<String>>("message") {
            let name = object
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            let stack = object.get::<_, Option<String>>("stack").ok().flatten();
            let cause = object
                .get::<_, Value<'js>>("cause")
                .ok()
                .filter(|cause| !cause.is_undefined())
                .map(|cause| error_cause(ctx, cause))
                .unwrap_or(serde_json::Value::Null);
            return RawError {
                name,
                message,
                stack,
                cause,
            };
        }
    }
    RawError {
        name: "Error".to_string(),
        message: coerce_string(ctx, value),
        stack: None,
        cause: serde_json::Value::Null,
    }
}

/// JSON form of a thrown error's `cause`. Values JSON cannot represent fall
/// back to their string form.
fn error_cause<'js>(ctx: &Ctx<'js>, cause: Value<'js>) -> serde_json::Value {
    if let Some(object) = cause.as_object() {
        if let Ok(Some(message)) = object.get::<_, Option<String>>("message") {
            if object.get::<_, Option<String>>("stack").ok().flatten().is_some() {
                let name = object
                    .get::<_, Option<String>>("name")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "Error".to_string());
                return serde_json::json!({ "name": name, "message": message });
            }
        }
    }
    json_stringify(ctx, cause.clone())
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_else(|| serde_json::Value::String(coerce_string(ctx, cause)))
}

pub fn caught_error<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>) -> RawError {
    match caught {
        CaughtError::Exception(exception) => raw_error(ctx, exception.as_object().clone().into_value()),
        CaughtError::Value(value) => raw_error(ctx, value),
        CaughtError::Error(error) => RawError {
            name: "Error".to_string(),
            message: error.to_string(),
            stack: None,
            cause: serde_json::Value::Null,
        },
    }
}
