use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Extensions tried, in order, for extensionless specifiers.
pub const RESOLVE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs", "cjs", "json"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Jsx,
    Js,
    Ts,
    Tsx,
    Json,
}

impl Loader {
    /// Pick the loader for a file. `.js` is parsed with JSX enabled, `.ts`
    /// is not.
    pub fn for_path(path: &Path) -> Result<Self, String> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "js" | "jsx" => Ok(Loader::Jsx),
            "mjs" | "cjs" => Ok(Loader::Js),
            "ts" | "mts" | "cts" => Ok(Loader::Ts),
            "tsx" => Ok(Loader::Tsx),
            "json" => Ok(Loader::Json),
            "" => Err(format!(
                "No loader is configured for files without an extension: {}",
                path.display()
            )),
            other => Err(format!(
                "No loader is configured for \".{}\" files: {}",
                other,
                path.display()
            )),
        }
    }

    pub fn jsx(&self) -> bool {
        matches!(self, Loader::Jsx | Loader::Tsx)
    }

    /// Types are stripped before the module is parsed.
    pub fn typescript(&self) -> bool {
        matches!(self, Loader::Ts | Loader::Tsx)
    }
}

/// How a specifier is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecifierKind {
    /// The reserved render module, under any path.
    Reserved,
    /// `./x`, `../x`, or an absolute path.
    Path,
    /// Left for the sandbox's module loader at run time.
    External,
    /// A package to find in `node_modules`.
    Package,
}

pub fn classify(specifier: &str, reserved: &str, host_modules: &[String]) -> SpecifierKind {
    if specifier == reserved || specifier.ends_with(&format!("/{}", reserved)) {
        return SpecifierKind::Reserved;
    }
    if specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
    {
        return SpecifierKind::Path;
    }
    if host_modules.iter().any(|m| m == specifier) || is_node_builtin(specifier) {
        return SpecifierKind::External;
    }
    SpecifierKind::Package
}

pub fn is_node_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let root = specifier.split('/').next().unwrap_or(specifier);
    NODE_BUILTINS.contains(&root)
}

/// Candidate files for a path specifier: the path itself, its TypeScript
/// counterpart when it names a `.js` file, the path with each known
/// extension appended, then `index.<ext>` inside it.
pub fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![base.to_path_buf()];
    let raw = base.as_os_str().to_string_lossy();
    let typescript: &[&str] = match base.extension().and_then(|e| e.to_str()) {
        Some("js") | Some("jsx") => &["ts", "tsx"],
        Some("mjs") => &["mts"],
        Some("cjs") => &["cts"],
        _ => &[],
    };
    for extension in typescript {
        candidates.push(base.with_extension(extension));
    }
    for extension in RESOLVE_EXTENSIONS {
        candidates.push(PathBuf::from(format!("{}.{}", raw, extension)));
    }
    for extension in RESOLVE_EXTENSIONS {
        candidates.push(base.join(format!("index.{}", extension)));
    }
    candidates
}

/// Split `@scope/name/sub/path` into (`@scope/name`, `sub/path`).
pub fn split_package(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        let scope = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        format!("{}/{}", scope, name)
    } else {
        parts.next().unwrap_or_default().to_string()
    };
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    main: Option<String>,
    module: Option<String>,
}

/// Entry point declared by a `package.json`, `main` first.
pub fn package_entry(manifest: &str) -> Option<String> {
    let manifest: PackageManifest = serde_json::from_str(manifest).ok()?;
    manifest.main.or(manifest.module).filter(|m| !m.is_empty())
}

/// `node_modules` directories from `dir` up to the filesystem root.
pub fn node_modules_dirs(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .filter(|d| d.file_name().map(|n| n != "node_modules").unwrap_or(true))
        .map(|d| d.join("node_modules"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_selection() {
        assert_eq!(Loader::for_path(Path::new("a.js")), Ok(Loader::Jsx));
        assert_eq!(Loader::for_path(Path::new("a.jsx")), Ok(Loader::Jsx));
        assert_eq!(Loader::for_path(Path::new("a.cjs")), Ok(Loader::Js));
        assert_eq!(Loader::for_path(Path::new("a.json")), Ok(Loader::Json));
        assert_eq!(Loader::for_path(Path::new("a.tsx")), Ok(Loader::Tsx));
        assert_eq!(Loader::for_path(Path::new("a.mts")), Ok(Loader::Ts));
        assert!(Loader::for_path(Path::new("a.tsx")).unwrap().jsx());
        assert!(!Loader::for_path(Path::new("a.ts")).unwrap().jsx());
        let err = Loader::for_path(Path::new("emails/a.vue")).unwrap_err();
        assert!(err.starts_with("No loader is configured for \".vue\" files"));
    }

    #[test]
    fn test_classify_specifiers() {
        let hosts = vec!["react".to_string(), "react/jsx-runtime".to_string()];
        let reserved = "@preview/render";
        assert_eq!(classify("@preview/render", reserved, &hosts), SpecifierKind::Reserved);
        assert_eq!(
            classify("../../node_modules/@preview/render", reserved, &hosts),
            SpecifierKind::Reserved
        );
        assert_eq!(classify("./button", reserved, &hosts), SpecifierKind::Path);
        assert_eq!(classify("react/jsx-runtime", reserved, &hosts), SpecifierKind::External);
        assert_eq!(classify("node:path", reserved, &hosts), SpecifierKind::External);
        assert_eq!(classify("fs/promises", reserved, &hosts), SpecifierKind::External);
        assert_eq!(classify("lodash/get", reserved, &hosts), SpecifierKind::Package);
    }

    #[test]
    fn test_candidates_order() {
        let list = candidates(Path::new("/p/emails/button"));
        assert_eq!(list[0], PathBuf::from("/p/emails/button"));
        assert_eq!(list[1], PathBuf::from("/p/emails/button.tsx"));
        assert_eq!(list[3], PathBuf::from("/p/emails/button.jsx"));
        assert_eq!(list[8], PathBuf::from("/p/emails/button/index.tsx"));

        let list = candidates(Path::new("/p/emails/button.js"));
        assert_eq!(list[1], PathBuf::from("/p/emails/button.ts"));
        assert_eq!(list[2], PathBuf::from("/p/emails/button.tsx"));
    }

    #[test]
    fn test_package_helpers() {
        assert_eq!(split_package("lodash"), ("lodash".to_string(), None));
        assert_eq!(
            split_package("@scope/pkg/dist/x.js"),
            ("@scope/pkg".to_string(), Some("dist/x.js".to_string()))
        );
        assert_eq!(package_entry(r#"{"main": "lib/index.js"}"#).as_deref(), Some("lib/index.js"));
        assert_eq!(package_entry(r#"{"name": "x"}"#), None);

        let dirs = node_modules_dirs(Path::new("/p/node_modules/a/lib"));
        assert_eq!(dirs[0], PathBuf::from("/p/node_modules/a/lib/node_modules"));
        assert!(dirs.contains(&PathBuf::from("/p/node_modules")));
        assert!(!dirs.contains(&PathBuf::from("/p/node_modules/node_modules")));
    }
}
