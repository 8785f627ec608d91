//! The fixed set of host globals a sandbox is seeded with.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Object, Value};
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use super::js;
use crate::paths;
use crate::types::{ConsoleEntry, ConsoleLevel};

const ENCODING_LIBRARY: &str = include_str!("../../runtime/encoding.js");
const STREAMS_LIBRARY: &str = include_str!("../../runtime/streams.js");
const WEB_LIBRARY: &str = include_str!("../../runtime/web.js");
const PROCESS_LIBRARY: &str = include_str!("../../runtime/process.js");

/// Console output captured from one sandbox.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink(Arc<Mutex<Vec<ConsoleEntry>>>);

impl ConsoleSink {
    pub fn push(&self, level: ConsoleLevel, message: String) {
        match level {
            ConsoleLevel::Warn | ConsoleLevel::Error => {
                warn!(target: "template_console", "{}", message)
            }
            _ => debug!(target: "template_console", "{}", message),
        }
        if let Ok(mut entries) = self.0.lock() {
            entries.push(ConsoleEntry { level, message });
        }
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// Per-invocation facts the installers expose to template code.
#[derive(Debug, Clone)]
pub struct SandboxHost {
    pub entry: PathBuf,
    pub env: HashMap<String, String>,
    pub console: ConsoleSink,
}

impl SandboxHost {
    fn to_object<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
        let host = Object::new(ctx.clone())?;
        host.set("env", self.env.clone())?;
        host.set("filename", self.entry.to_string_lossy().into_owned())?;
        host.set(
            "cwd",
            paths::project_root(&self.entry).to_string_lossy().into_owned(),
        )?;
        host.set("platform", node_platform())?;
        host.set("arch", node_arch())?;
        Ok(host)
    }
}

fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

pub type NativeInstaller = for<'js> fn(&Ctx<'js>, &SandboxHost) -> rquickjs::Result<Value<'js>>;

#[derive(Clone)]
pub enum Installer {
    /// Built in Rust.
    Native(NativeInstaller),
    /// Taken from a script library: a factory `(native, host) => exports`
    /// evaluated at most once per sandbox.
    Library {
        library: &'static str,
        source: &'static str,
        export: &'static str,
    },
}

/// A named global binding and how to build it.
#[derive(Clone)]
pub struct Capability {
    pub name: &'static str,
    pub installer: Installer,
}

impl Capability {
    pub const fn native(name: &'static str, install: NativeInstaller) -> Self {
        Self {
            name,
            installer: Installer::Native(install),
        }
    }

    pub const fn library(name: &'static str, library: &'static str, source: &'static str) -> Self {
        Self {
            name,
            installer: Installer::Library {
                library,
                source,
                export: name,
            },
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

/// Ordered allow-list of globals. Anything not listed here is absent from
/// the sandbox.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    entries: Vec<Capability>,
}

impl CapabilityTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// console, binary and text encoding, streams, URL and header
    /// utilities, abort signalling, and a process handle.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                Capability::native("console", install_console),
                Capability::library("Buffer", "encoding", ENCODING_LIBRARY),
                Capability::library("TextEncoder", "encoding", ENCODING_LIBRARY),
                Capability::library("TextDecoder", "encoding", ENCODING_LIBRARY),
                Capability::library("ReadableStream", "streams", STREAMS_LIBRARY),
                Capability::library("TextEncoderStream", "streams", STREAMS_LIBRARY),
                Capability::library("TextDecoderStream", "streams", STREAMS_LIBRARY),
                Capability::library("URL", "web", WEB_LIBRARY),
                Capability::library("URLSearchParams", "web", WEB_LIBRARY),
                Capability::library("Headers", "web", WEB_LIBRARY),
                Capability::library("AbortController", "web", WEB_LIBRARY),
                Capability::library("process", "process", PROCESS_LIBRARY),
            ],
        }
    }

    /// Add a capability, replacing any existing one with the same name.
    pub fn with(mut self, capability: Capability) -> Self {
        self.entries.retain(|c| c.name != capability.name);
        self.entries.push(capability);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|c| c.name != name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|c| c.name).collect()
    }

    pub fn install<'js>(&self, ctx: &Ctx<'js>, host: &SandboxHost) -> rquickjs::Result<()> {
        let globals = ctx.globals();
        let natives = natives(ctx)?;
        let host_object = host.to_object(ctx)?;
        let mut libraries: HashMap<&'static str, Object<'js>> = HashMap::new();

        for capability in &self.entries {
            let value: Value<'js> = match &capability.installer {
                Installer::Native(install) => install(ctx, host)?,
                Installer::Library {
                    library,
                    source,
                    export,
                } => {
                    let exports = match libraries.get(library) {
                        Some(exports) => exports.clone(),
                        None => {
                            let factory: Function = ctx.eval(*source)?;
                            let exports: Object =
                                factory.call((natives.clone(), host_object.clone()))?;
                            libraries.insert(*library, exports.clone());
                            exports
                        }
                    };
                    exports.get(*export)?
                }
            };
            globals.set(capability.name, value)?;
        }
        Ok(())
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn install_console<'js>(ctx: &Ctx<'js>, host: &SandboxHost) -> rquickjs::Result<Value<'js>> {
    let console = Object::new(ctx.clone())?;
    let methods = [
        ("log", ConsoleLevel::Log),
        ("info", ConsoleLevel::Info),
        ("debug", ConsoleLevel::Debug),
        ("trace", ConsoleLevel::Debug),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ];
    for (method, level) in methods {
        let sink = host.console.clone();
        let function = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            let message = args
                .0
                .into_iter()
                .map(|value| js::display(&ctx, value))
                .collect::<Vec<_>>()
                .join(" ");
            sink.push(level, message);
        })?;
        console.set(method, function)?;
    }
    Ok(console.into_value())
}

/// Host-implemented codecs handed to the script libraries.
fn natives<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let natives = Object::new(ctx.clone())?;
    natives.set(
        "utf8Encode",
        Function::new(ctx.clone(), |text: String| text.into_bytes())?,
    )?;
    natives.set(
        "utf8Decode",
        Function::new(ctx.clone(), |bytes: Vec<u8>| {
            String::from_utf8_lossy(&bytes).into_owned()
        })?,
    )?;
    natives.set(
        "base64Encode",
        Function::new(ctx.clone(), |bytes: Vec<u8>| {
            general_purpose::STANDARD.encode(bytes)
        })?,
    )?;
    natives.set(
        "base64Decode",
        Function::new(ctx.clone(), |text: String| decode_base64(&text))?,
    )?;
    natives.set(
        "hexEncode",
        Function::new(ctx.clone(), |bytes: Vec<u8>| hex::encode(bytes))?,
    )?;
    natives.set(
        "hexDecode",
        Function::new(ctx.clone(), |text: String| decode_hex(&text))?,
    )?;
    natives.set(
        "parseUrl",
        Function::new(ctx.clone(), |input: String, base: Opt<String>| {
            parse_url(&input, base.0.as_deref())
        })?,
    )?;
    natives.set(
        "setUrlPart",
        Function::new(ctx.clone(), |href: String, part: String, value: String| {
            set_url_part(&href, &part, &value)
        })?,
    )?;
    natives.set(
        "parseQuery",
        Function::new(ctx.clone(), |query: String| parse_query(&query))?,
    )?;
    natives.set(
        "serializeQuery",
        Function::new(ctx.clone(), |pairs: Vec<Vec<String>>| serialize_query(&pairs))?,
    )?;
    Ok(natives)
}

/// Lenient base64: accepts the URL-safe alphabet, whitespace, and missing
/// padding. Undecodable input yields no bytes.
pub fn decode_base64(text: &str) -> Vec<u8> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    general_purpose::STANDARD_NO_PAD
        .decode(cleaned)
        .unwrap_or_default()
}

/// Hex decoding stops at the first invalid pair.
pub fn decode_hex(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() / 2);
    for pair in text.as_bytes().chunks_exact(2) {
        match std::str::from_utf8(pair)
            .ok()
            .and_then(|p| u8::from_str_radix(p, 16).ok())
        {
            Some(byte) => bytes.push(byte),
            None => break,
        }
    }
    bytes
}

/// WHATWG URL components, or `None` for an invalid URL.
pub fn parse_url(input: &str, base: Option<&str>) -> Option<HashMap<String, String>> {
    let url = match base {
        Some(base) => Url::parse(base).ok()?.join(input).ok()?,
        None => Url::parse(input).ok()?,
    };
    Some(url_parts(&url))
}

fn url_parts(url: &Url) -> HashMap<String, String> {
    let hostname = url.host_str().unwrap_or_default().to_string();
    let host = match url.port() {
        Some(port) => format!("{}:{}", hostname, port),
        None => hostname.clone(),
    };
    let prefixed = |prefix: char, part: Option<&str>| {
        part.filter(|p| !p.is_empty())
            .map(|p| format!("{}{}", prefix, p))
            .unwrap_or_default()
    };

    HashMap::from([
        ("href".to_string(), url.as_str().to_string()),
        ("origin".to_string(), url.origin().ascii_serialization()),
        ("protocol".to_string(), format!("{}:", url.scheme())),
        ("username".to_string(), url.username().to_string()),
        (
            "password".to_string(),
            url.password().unwrap_or_default().to_string(),
        ),
        ("host".to_string(), host),
        ("hostname".to_string(), hostname),
        (
            "port".to_string(),
            url.port().map(|p| p.to_string()).unwrap_or_default(),
        ),
        ("pathname".to_string(), url.path().to_string()),
        ("search".to_string(), prefixed('?', url.query())),
        ("hash".to_string(), prefixed('#', url.fragment())),
    ])
}

/// Apply a URL property assignment and return the new href.
pub fn set_url_part(href: &str, part: &str, value: &str) -> Option<String> {
    let mut url = Url::parse(href).ok()?;
    match part {
        "protocol" => url.set_scheme(value.trim_end_matches(':')).ok()?,
        "username" => url.set_username(value).ok()?,
        "password" => url
            .set_password(Some(value).filter(|v| !v.is_empty()))
            .ok()?,
        "host" => {
            let (hostname, port) = match value.rsplit_once(':') {
                Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
                _ => (value, None),
            };
            url.set_host(Some(hostname)).ok()?;
            if let Some(port) = port {
                url.set_port(port.parse().ok()).ok()?;
            }
        }
        "hostname" => url.set_host(Some(value)).ok()?,
        "port" => {
            let port = if value.is_empty() {
                None
            } else {
                Some(value.parse().ok()?)
            };
            url.set_port(port).ok()?
        }
        "pathname" => url.set_path(value),
        "search" => {
            let query = value.trim_start_matches('?');
            url.set_query(Some(query).filter(|q| !q.is_empty()));
        }
        "hash" => {
            let fragment = value.trim_start_matches('#');
            url.set_fragment(Some(fragment).filter(|f| !f.is_empty()));
        }
        _ => return None,
    }
    Some(url.to_string())
}

pub fn parse_query(query: &str) -> Vec<Vec<String>> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| vec![name.into_owned(), value.into_owned()])
        .collect()
}

pub fn serialize_query(pairs: &[Vec<String>]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for pair in pairs {
        if let Some(name) = pair.first() {
            serializer.append_pair(name, pair.get(1).map(String::as_str).unwrap_or_default());
        }
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_lists_the_allow_list() {
        let table = CapabilityTable::standard();
        assert_eq!(
            table.names(),
            vec![
                "console",
                "Buffer",
                "TextEncoder",
                "TextDecoder",
                "ReadableStream",
                "TextEncoderStream",
                "TextDecoderStream",
                "URL",
                "URLSearchParams",
                "Headers",
                "AbortController",
                "process",
            ]
        );
        let table = table.without("process");
        assert!(!table.contains("process"));
        assert!(table.contains("URL"));
    }

    #[test]
    fn test_lenient_base64() {
        assert_eq!(decode_base64("aGVsbG8="), b"hello");
        assert_eq!(decode_base64("aGVs bG8"), b"hello");
        assert_eq!(decode_base64("-_8"), vec![0xfb, 0xff]);
        assert!(decode_base64("***").is_empty());
    }

    #[test]
    fn test_hex_stops_at_invalid_input() {
        assert_eq!(decode_hex("48656c6c6f"), b"Hello");
        assert_eq!(decode_hex("4865zz6c"), b"He");
        assert_eq!(decode_hex("486"), b"H");
    }

    #[test]
    fn test_url_components() {
        let parts = parse_url("https://user:pw@example.com:8080/a/b?x=1#top", None).unwrap();
        assert_eq!(parts["protocol"], "https:");
        assert_eq!(parts["host"], "example.com:8080");
        assert_eq!(parts["hostname"], "example.com");
        assert_eq!(parts["port"], "8080");
        assert_eq!(parts["pathname"], "/a/b");
        assert_eq!(parts["search"], "?x=1");
        assert_eq!(parts["hash"], "#top");
        assert_eq!(parts["origin"], "https://example.com:8080");

        let joined = parse_url("../c", Some("https://example.com/a/b/")).unwrap();
        assert_eq!(joined["href"], "https://example.com/a/c");
        assert!(parse_url("not a url", None).is_none());
    }

    #[test]
    fn test_url_part_updates() {
        let href = "https://example.com/a?x=1";
        assert_eq!(
            set_url_part(href, "search", "?y=2").as_deref(),
            Some("https://example.com/a?y=2")
        );
        assert_eq!(
            set_url_part(href, "host", "example.org:81").as_deref(),
            Some("https://example.org:81/a?x=1")
        );
        assert_eq!(
            set_url_part(href, "hash", "#frag").as_deref(),
            Some("https://example.com/a?x=1#frag")
        );
        assert_eq!(set_url_part(href, "origin", "x"), None);
    }

    #[test]
    fn test_query_round_trip_encoding() {
        let pairs = parse_query("a=1&b=hello+world&c=%26");
        assert_eq!(pairs[1], vec!["b".to_string(), "hello world".to_string()]);
        assert_eq!(serialize_query(&pairs), "a=1&b=hello+world&c=%26");
    }
}
