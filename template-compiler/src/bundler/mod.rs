//! Module graph bundling.
//!
//! Starting from the entry file, every statically referenced module is
//! loaded, converted from ES module syntax (and JSX) to CommonJS, and
//! written into a single script that registers each module in a table and
//! requires the entry. Bare specifiers that name host modules or Node
//! built-ins stay as run-time `require` calls. A source map v3 file is
//! produced alongside the code.

pub mod cache;
mod emit;
mod jsx;
mod lexer;
mod resolve;
pub mod runtime;
mod syntax;
mod transform;
mod typescript;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use cache::{CacheStats, ContentCache};

use crate::error::Error;
use crate::paths;
use crate::resolver::SourceResolver;
use crate::sandbox::modules::DEFAULT_HOST_MODULES;
use crate::sourcemap::{decode_vlq_mappings, RawSourceMap};
use emit::{CodeWriter, LineIndex, ModuleEmitter};
use jsx::json_string;
use lexer::{tokenize, Token};
use resolve::{Loader, SpecifierKind};
use transform::{analyze, AnalyzeOptions, ModuleAnalysis};

/// Most errors listed in a build failure message.
const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOptions {
    /// Virtual module pinned to the canonical renderer
    pub render_specifier: String,
    /// Re-export `renderAsync` from the renderer out of the entry module
    pub inject_render_export: bool,
    /// Package providing `<source>/jsx-runtime`
    pub jsx_import_source: String,
    /// Virtual output directory, relative to the project root
    pub out_dir: String,
}

impl BundleOptions {
    pub fn with_render_specifier(mut self, specifier: impl Into<String>) -> Self {
        self.render_specifier = specifier.into();
        self
    }

    pub fn with_inject_render_export(mut self, inject: bool) -> Self {
        self.inject_render_export = inject;
        self
    }

    pub fn with_jsx_import_source(mut self, source: impl Into<String>) -> Self {
        self.jsx_import_source = source.into();
        self
    }

    fn jsx_runtime(&self) -> String {
        format!("{}/jsx-runtime", self.jsx_import_source)
    }
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            render_specifier: "@preview/render".to_string(),
            inject_render_export: true,
            jsx_import_source: "react".to_string(),
            out_dir: ".preview-out".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLocation {
    pub file: String,
    /// 1-based
    pub line: u32,
    /// 0-based
    pub column: u32,
    pub line_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessage {
    pub text: String,
    pub location: Option<BuildLocation>,
}

/// Every error found while building. No artifact exists when this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub errors: Vec<BuildMessage>,
}

impl BuildFailure {
    pub fn message(&self) -> String {
        let count = self.errors.len();
        let mut message = format!(
            "Build failed with {} error{}:",
            count,
            if count == 1 { "" } else { "s" }
        );
        for error in self.errors.iter().take(MAX_REPORTED_ERRORS) {
            message.push('\n');
            match &error.location {
                Some(loc) => message.push_str(&format!(
                    "{}:{}:{}: ERROR: {}",
                    loc.file, loc.line, loc.column, error.text
                )),
                None => message.push_str(&format!("error: {}", error.text)),
            }
        }
        if count > MAX_REPORTED_ERRORS {
            message.push_str(&format!("\n...and {} more", count - MAX_REPORTED_ERRORS));
        }
        message
    }
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Bundled code and its source map. Only ever produced whole.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub code: String,
    pub source_map: RawSourceMap,
    pub code_path: PathBuf,
    pub source_map_path: PathBuf,
    /// Module ids in load order, entry first
    pub modules: Vec<String>,
}

impl BuildArtifact {
    /// The two emitted files: `[0]` the source map, `[1]` the code.
    pub fn output_files(&self) -> [OutputFile; 2] {
        [
            OutputFile {
                path: self.source_map_path.clone(),
                contents: self.source_map.to_json(),
            },
            OutputFile {
                path: self.code_path.clone(),
                contents: self.code.clone(),
            },
        ]
    }
}

struct LoadedModule {
    path: PathBuf,
    id: String,
    /// The file as read, for source maps and error locations.
    source: String,
    /// The code that is parsed and emitted, with types stripped.
    src: String,
    loader: Loader,
    tokens: Vec<Token>,
    analysis: ModuleAnalysis,
    resolved: HashMap<String, String>,
}

enum Resolution {
    Module(PathBuf),
    External(String),
}

pub struct Bundler<'a> {
    entry: PathBuf,
    resolver: &'a SourceResolver,
    options: &'a BundleOptions,
    cache: Option<&'a ContentCache>,
    host_modules: Vec<String>,
}

impl<'a> Bundler<'a> {
    pub fn new(entry: &Path, resolver: &'a SourceResolver, options: &'a BundleOptions) -> Self {
        Self {
            entry: paths::absolute(entry),
            resolver,
            options,
            cache: None,
            host_modules: DEFAULT_HOST_MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Share file contents across builds. Ignored while overrides are active.
    pub fn with_cache(mut self, cache: &'a ContentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bare specifiers provided by the sandbox at run time.
    pub fn with_host_modules(mut self, host_modules: Vec<String>) -> Self {
        self.host_modules = host_modules;
        self
    }

    fn root(&self) -> &Path {
        self.resolver.project_root()
    }

    fn renderer_path(&self) -> PathBuf {
        self.root().join(runtime::RENDERER_PATH)
    }

    fn out_dir(&self) -> PathBuf {
        self.root().join(&self.options.out_dir)
    }

    /// Files below the entry's directory go through the resolver so that
    /// unpublished edits are seen.
    fn in_scope(&self, path: &Path) -> bool {
        path.starts_with(paths::parent_dir(&self.entry))
    }

    fn module_id(&self, path: &Path) -> String {
        match paths::relative_to(self.root(), path) {
            Some(relative) => format!("./{}", relative),
            None => paths::to_slash(path),
        }
    }

    fn display_path(&self, path: &Path) -> String {
        paths::relative_to(self.root(), path).unwrap_or_else(|| paths::to_slash(path))
    }

    async fn exists(&self, path: &Path) -> bool {
        if *path == self.renderer_path() {
            return true;
        }
        if self.in_scope(path) {
            return self.resolver.exists(path).await;
        }
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> std::io::Result<String> {
        if *path == self.renderer_path() {
            return Ok(runtime::RENDERER_SOURCE.to_string());
        }
        if self.in_scope(path) {
            if let (Some(cache), false) = (self.cache, self.resolver.overrides_active()) {
                return cache.read(path).await.map(|content| content.to_string());
            }
            return self.resolver.read(path).await;
        }
        tokio::fs::read_to_string(path).await
    }

    async fn first_existing(&self, base: &Path) -> Option<PathBuf> {
        for candidate in resolve::candidates(base) {
            if self.exists(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn resolve(&self, specifier: &str, importer: &Path) -> Option<Resolution> {
        let importer_dir = paths::parent_dir(importer);
        match resolve::classify(specifier, &self.options.render_specifier, &self.host_modules) {
            SpecifierKind::Reserved => Some(Resolution::Module(self.renderer_path())),
            SpecifierKind::External => Some(Resolution::External(specifier.to_string())),
            SpecifierKind::Path => {
                let base = paths::normalize(&importer_dir.join(specifier));
                self.first_existing(&base).await.map(Resolution::Module)
            }
            SpecifierKind::Package => {
                let (name, subpath) = resolve::split_package(specifier);
                for modules_dir in resolve::node_modules_dirs(&importer_dir) {
                    let package_dir = modules_dir.join(&name);
                    if !tokio::fs::metadata(&package_dir)
                        .await
                        .map(|m| m.is_dir())
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    if let Some(subpath) = &subpath {
                        if let Some(found) = self.first_existing(&package_dir.join(subpath)).await {
                            return Some(Resolution::Module(found));
                        }
                        continue;
                    }
                    let manifest = tokio::fs::read_to_string(package_dir.join("package.json"))
                        .await
                        .ok()
                        .and_then(|m| resolve::package_entry(&m));
                    if let Some(main) = manifest {
                        let base = paths::normalize(&package_dir.join(main));
                        if let Some(found) = self.first_existing(&base).await {
                            return Some(Resolution::Module(found));
                        }
                    }
                    if let Some(found) = self.first_existing(&package_dir.join("index")).await {
                        return Some(Resolution::Module(found));
                    }
                }
                None
            }
        }
    }

    fn location(&self, path: &Path, src: &str, offset: usize) -> BuildLocation {
        let index = LineIndex::new(src);
        let (line, column) = index.position(src, offset);
        BuildLocation {
            file: self.display_path(path),
            line: line + 1,
            column,
            line_text: src.lines().nth(line as usize).unwrap_or_default().to_string(),
        }
    }

    /// Parse one module. Errors are appended to `errors`.
    fn parse(
        &self,
        path: &Path,
        src: String,
        errors: &mut Vec<BuildMessage>,
    ) -> Option<LoadedModule> {
        let loader = match Loader::for_path(path) {
            Ok(loader) => loader,
            Err(text) => {
                errors.push(BuildMessage {
                    text,
                    location: None,
                });
                return None;
            }
        };

        let code = if loader.typescript() {
            match typescript::strip_types(&src, loader.jsx()) {
                Ok(code) => code,
                Err(e) => {
                    errors.push(BuildMessage {
                        text: e.message.clone(),
                        location: Some(self.location(path, &src, e.offset)),
                    });
                    return None;
                }
            }
        } else {
            src.clone()
        };

        let mut module = LoadedModule {
            path: path.to_path_buf(),
            id: self.module_id(path),
            source: src,
            src: code,
            loader,
            tokens: Vec::new(),
            analysis: ModuleAnalysis::default(),
            resolved: HashMap::new(),
        };

        if loader == Loader::Json {
            if let Err(e) = serde_json::from_str::<serde_json::Value>(&module.src) {
                let index = LineIndex::new(&module.src);
                let offset = index.offset(
                    &module.src,
                    e.line().saturating_sub(1) as u32,
                    e.column().saturating_sub(1) as u32,
                );
                errors.push(BuildMessage {
                    text: format!("Invalid JSON: {}", e),
                    location: Some(self.location(path, &module.src, offset)),
                });
                return None;
            }
            return Some(module);
        }

        let inject_render = (self.options.inject_render_export && *path == self.entry)
            .then(|| self.options.render_specifier.clone());
        let options = AnalyzeOptions {
            jsx_runtime: self.options.jsx_runtime(),
            inject_render,
            file_url: url::Url::from_file_path(path)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| format!("file://{}", paths::to_slash(path))),
        };

        let parsed = tokenize(&module.src, loader.jsx())
            .and_then(|tokens| analyze(&tokens, &module.src, &options).map(|a| (tokens, a)));
        match parsed {
            Ok((tokens, analysis)) => {
                module.tokens = tokens;
                module.analysis = analysis;
                Some(module)
            }
            Err(e) => {
                errors.push(BuildMessage {
                    text: e.message.clone(),
                    location: Some(self.location(path, &module.source, e.offset)),
                });
                None
            }
        }
    }

    pub async fn bundle(&self) -> Result<BuildArtifact, Error> {
        let mut errors = Vec::new();
        let mut modules: Vec<LoadedModule> = Vec::new();
        let mut queued: HashSet<PathBuf> = HashSet::from([self.entry.clone()]);
        let mut queue: VecDeque<(PathBuf, Option<BuildLocation>)> =
            VecDeque::from([(self.entry.clone(), None)]);

        while let Some((path, imported_at)) = queue.pop_front() {
            let src = match self.read(&path).await {
                Ok(src) => src,
                Err(e) => {
                    debug!("Failed to read {}: {}", path.display(), e);
                    errors.push(BuildMessage {
                        text: format!("Could not read from file: {}", path.display()),
                        location: imported_at,
                    });
                    continue;
                }
            };
            let Some(mut module) = self.parse(&path, src, &mut errors) else {
                continue;
            };

            let mut attempted = HashSet::new();
            for dependency in &module.analysis.dependencies {
                if !attempted.insert(dependency.specifier.clone()) {
                    continue;
                }
                match self.resolve(&dependency.specifier, &path).await {
                    Some(Resolution::External(specifier)) => {
                        module.resolved.insert(dependency.specifier.clone(), specifier);
                    }
                    Some(Resolution::Module(target)) => {
                        module
                            .resolved
                            .insert(dependency.specifier.clone(), self.module_id(&target));
                        if queued.insert(target.clone()) {
                            let at = self.location(&path, &module.source, dependency.offset);
                            queue.push_back((target, Some(at)));
                        }
                    }
                    None => errors.push(BuildMessage {
                        text: format!("Could not resolve \"{}\"", dependency.specifier),
                        location: Some(self.location(&path, &module.source, dependency.offset)),
                    }),
                }
            }
            debug!(
                "Loaded {} ({} dependencies)",
                module.id,
                module.analysis.dependencies.len()
            );
            modules.push(module);
        }

        if !errors.is_empty() {
            return Err(Error::Build(BuildFailure { errors }));
        }

        let artifact = self.emit(&modules);
        let code = artifact.code.clone();
        let checked = tokio::task::spawn_blocking(move || syntax::check(&code))
            .await
            .map_err(|e| Error::System(e.to_string()))?;

        if let Err(syntax_error) = checked {
            let location = decode_vlq_mappings(&artifact.source_map.mappings)
                .ok()
                .and_then(|decoded| {
                    decoded
                        .lookup(syntax_error.line.saturating_sub(1), syntax_error.column)
                        .cloned()
                })
                .and_then(|mapping| {
                    let module = modules.get(mapping.source as usize)?;
                    Some(BuildLocation {
                        file: self.display_path(&module.path),
                        line: mapping.original_line + 1,
                        column: mapping.original_column,
                        line_text: module
                            .source
                            .lines()
                            .nth(mapping.original_line as usize)
                            .unwrap_or_default()
                            .to_string(),
                    })
                });
            return Err(Error::Build(BuildFailure {
                errors: vec![BuildMessage {
                    text: syntax_error.message,
                    location,
                }],
            }));
        }

        info!(
            "Bundled {} ({} modules, {} bytes)",
            self.entry.display(),
            artifact.modules.len(),
            artifact.code.len()
        );
        Ok(artifact)
    }

    fn emit(&self, modules: &[LoadedModule]) -> BuildArtifact {
        let out_dir = self.out_dir();
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let code_name = format!("{}.js", stem);
        let code_path = out_dir.join(&code_name);
        let source_map_path = out_dir.join(format!("{}.map", code_name));

        let mut writer = CodeWriter::new();
        writer.write(runtime::PRELUDE);

        for module in modules {
            let source =
                writer.add_source(paths::diff(&out_dir, &module.path), Some(module.source.clone()));
            writer.write(&format!(
                "__preview_modules[{}] = function (exports, require, module) {{\n",
                json_string(&module.id)
            ));

            if module.loader == Loader::Json {
                writer.write("module.exports = ");
                writer.map_to(source, 0, 0);
                writer.write(module.src.trim_end());
                writer.write(";");
            } else {
                let index = LineIndex::new(&module.src);
                let mut emitter = ModuleEmitter {
                    writer: &mut writer,
                    src: &module.src,
                    index: &index,
                    source,
                    rewrites: &module.analysis.rewrites,
                    resolved: &module.resolved,
                };
                emitter.pieces(&module.analysis.header);
                emitter.writer.write("\n");

                // a hashbang line is dropped
                let (tokens, start) = match module.tokens.first() {
                    Some(first) if first.is_comment() && module.src.starts_with("#!") => {
                        (&module.tokens[1..], first.end)
                    }
                    _ => (&module.tokens[..], 0),
                };
                emitter.emit_tokens(tokens, start, module.src.len());
            }
            writer.write("\n};\n");
        }

        let entry_id = modules
            .first()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| self.module_id(&self.entry));
        writer.write(&format!(
            "module.exports = __preview_require({});\n",
            json_string(&entry_id)
        ));

        let (mut code, source_map) = writer.finish(Some(code_name.clone()));
        code.push_str(&format!("//# sourceMappingURL={}.map\n", code_name));

        BuildArtifact {
            code,
            source_map,
            code_path,
            source_map_path,
            modules: modules.iter().map(|m| m.id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use override_client::FileOverride;

    fn options() -> BundleOptions {
        BundleOptions::default().with_inject_render_export(false)
    }

    async fn build(entry: &Path, options: &BundleOptions) -> Result<BuildArtifact, Error> {
        let resolver = SourceResolver::disk_only(entry);
        Bundler::new(entry, &resolver, options).bundle().await
    }

    #[tokio::test]
    async fn test_bundles_module_graph() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/welcome.jsx")
            .write_str(
                "import Button from './components/button';\nimport data from './data.json';\nexport default function Welcome() {\n  return <Button label={data.label} />;\n}\n",
            )
            .unwrap();
        project
            .child("app/emails/components/button.jsx")
            .write_str("export default ({ label }) => <a>{label}</a>;\n")
            .unwrap();
        project
            .child("app/emails/data.json")
            .write_str("{\"label\": \"Go\"}\n")
            .unwrap();

        let entry = project.child("app/emails/welcome.jsx").path().to_path_buf();
        let artifact = build(&entry, &options()).await.unwrap();

        assert_eq!(
            artifact.modules,
            vec![
                "./emails/welcome.jsx",
                "./emails/components/button.jsx",
                "./emails/data.json"
            ]
        );
        assert!(artifact.code.contains("require(\"./emails/components/button.jsx\")"));
        assert!(artifact.code.contains("require(\"react/jsx-runtime\")"));
        assert!(artifact
            .code
            .contains("module.exports = __preview_require(\"./emails/welcome.jsx\");"));
        assert!(!artifact.code.contains("import "));
        assert!(artifact.code.ends_with("//# sourceMappingURL=welcome.js.map\n"));

        assert_eq!(artifact.source_map.sources[0], "../emails/welcome.jsx");
        assert_eq!(
            artifact.source_map_path,
            project.path().join("app/.preview-out/welcome.js.map")
        );
        let [map_file, code_file] = artifact.output_files();
        assert!(map_file.path.ends_with("welcome.js.map"));
        assert!(code_file.path.ends_with("welcome.js"));
    }

    #[tokio::test]
    async fn test_reserved_specifier_is_pinned_to_one_module() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("import { render } from '@preview/render';\nimport b from './b';\nexport default () => [render, b];\n")
            .unwrap();
        project
            .child("app/emails/b.jsx")
            .write_str("import { render } from '../node_modules/@preview/render';\nexport default render;\n")
            .unwrap();

        let entry = project.child("app/emails/a.jsx").path().to_path_buf();
        let artifact = build(&entry, &options()).await.unwrap();
        let renderer = "./node_modules/@preview/render/index.js";
        assert_eq!(
            artifact.modules.iter().filter(|m| m.as_str() == renderer).count(),
            1
        );
        assert_eq!(
            artifact
                .code
                .matches(&format!("require(\"{}\")", renderer))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_render_export_is_injected_into_entry() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("export default () => null;\n")
            .unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();

        let artifact = build(&entry, &BundleOptions::default()).await.unwrap();
        assert!(artifact.code.contains("renderAsync: () => __preview_render.renderAsync"));
        assert!(artifact
            .modules
            .contains(&"./node_modules/@preview/render/index.js".to_string()));
    }

    #[tokio::test]
    async fn test_unresolvable_import_is_a_build_error() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("import x from './nope';\nimport y from 'left-pad';\nexport default x;\n")
            .unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();

        let Err(Error::Build(failure)) = build(&entry, &options()).await else {
            panic!("expected a build failure");
        };
        assert_eq!(failure.errors.len(), 2);
        assert_eq!(
            failure.message(),
            "Build failed with 2 errors:\nemails/a.jsx:1:14: ERROR: Could not resolve \"./nope\"\nemails/a.jsx:2:14: ERROR: Could not resolve \"left-pad\""
        );
    }

    #[tokio::test]
    async fn test_syntax_error_is_located_in_original_file() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("import b from './b';\nexport default b;\n")
            .unwrap();
        project
            .child("app/emails/b.jsx")
            .write_str("const ok = 1;\nconst broken = ;\nexport default ok;\n")
            .unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();

        let Err(Error::Build(failure)) = build(&entry, &options()).await else {
            panic!("expected a build failure");
        };
        let location = failure.errors[0].location.clone().unwrap();
        assert_eq!(location.file, "emails/b.jsx");
        assert_eq!(location.line, 2);
        assert_eq!(location.line_text, "const broken = ;");
    }

    #[tokio::test]
    async fn test_tsx_entry_imports_ts_helper() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/card.tsx")
            .write_str(
                "import type { Theme } from './theme';\nimport { shout } from './shout';\ntype P = { a: string };\nexport default (p: P) => <p>{shout(p.a)}</p>;\n",
            )
            .unwrap();
        project
            .child("app/emails/shout.ts")
            .write_str("export function shout<T extends string>(text: T): string {\n  return text.toUpperCase()!;\n}\n")
            .unwrap();
        let entry = project.child("app/emails/card.tsx").path().to_path_buf();
        let artifact = build(&entry, &options()).await.unwrap();

        assert_eq!(artifact.modules, vec!["./emails/card.tsx", "./emails/shout.ts"]);
        assert!(!artifact.code.contains("./theme"));
        assert!(!artifact.code.contains("type P"));
        assert!(!artifact.code.contains("<T extends"));
        assert!(!artifact.code.contains("text: T"));
        assert!(artifact.code.contains("require(\"./emails/shout.ts\")"));

        // the map still carries the TypeScript source
        let contents = artifact.source_map.sources_content.clone().unwrap();
        assert!(contents[0].as_deref().unwrap().contains("type P = { a: string };"));
    }

    #[tokio::test]
    async fn test_js_specifier_finds_ts_file() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.tsx")
            .write_str("import t from './t.js';\nexport default () => <b>{t}</b>;\n")
            .unwrap();
        project
            .child("app/emails/t.ts")
            .write_str("export default 1 as number;\n")
            .unwrap();
        let entry = project.child("app/emails/a.tsx").path().to_path_buf();
        let artifact = build(&entry, &options()).await.unwrap();

        assert_eq!(artifact.modules, vec!["./emails/a.tsx", "./emails/t.ts"]);
        assert!(!artifact.code.contains(" as number"));
    }

    #[tokio::test]
    async fn test_typescript_errors_point_at_source() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.ts")
            .write_str("const x: number = 1;\nenum Color { Red }\nexport default x;\n")
            .unwrap();
        let entry = project.child("app/emails/a.ts").path().to_path_buf();

        let Err(Error::Build(failure)) = build(&entry, &options()).await else {
            panic!("expected a build failure");
        };
        assert_eq!(failure.errors[0].text, "TypeScript enums are not supported");
        let location = failure.errors[0].location.clone().unwrap();
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 0);
        assert_eq!(location.line_text, "enum Color { Red }");
    }

    #[tokio::test]
    async fn test_unsupported_extension_has_no_loader() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("import t from './t.vue';\nexport default t;\n")
            .unwrap();
        project.child("app/emails/t.vue").write_str("<template></template>\n").unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();

        let Err(Error::Build(failure)) = build(&entry, &options()).await else {
            panic!("expected a build failure");
        };
        assert!(failure.errors[0]
            .text
            .starts_with("No loader is configured for \".vue\" files"));
    }

    #[tokio::test]
    async fn test_override_only_file_is_bundled() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("export default 'disk';\n")
            .unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();
        let resolver = SourceResolver::with_overrides(
            &entry,
            vec![
                FileOverride::new("emails/a.jsx", "import b from './b';\nexport default b;\n"),
                FileOverride::new("emails/b.jsx", "export default 'edited';\n"),
            ],
        );
        let cache = ContentCache::new();
        let options = options();
        let artifact = Bundler::new(&entry, &resolver, &options)
            .with_cache(&cache)
            .bundle()
            .await
            .unwrap();

        assert!(artifact.code.contains("'edited'"));
        assert!(!artifact.code.contains("'disk'"));
        // nothing is cached while overrides are active
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_node_modules_package_resolution() {
        let project = TempDir::new().unwrap();
        project
            .child("app/emails/a.jsx")
            .write_str("import pad from 'pad';\nexport default pad;\n")
            .unwrap();
        project
            .child("app/node_modules/pad/package.json")
            .write_str(r#"{"name": "pad", "main": "lib/pad"}"#)
            .unwrap();
        project
            .child("app/node_modules/pad/lib/pad.js")
            .write_str("module.exports = function pad(s) { return ' ' + s; };\n")
            .unwrap();
        let entry = project.child("app/emails/a.jsx").path().to_path_buf();

        let artifact = build(&entry, &options()).await.unwrap();
        assert!(artifact
            .modules
            .contains(&"./node_modules/pad/lib/pad.js".to_string()));
    }
}
