//! Module-level rewriting plan: ES module syntax to CommonJS, literal
//! `require()` specifiers to resolved module ids, and the per-module header
//! that installs export getters and runtime imports.

use std::collections::BTreeMap;

use super::jsx::{is_identifier, json_string, property_key, JsxExpr};
use super::lexer::{SyntaxError, TemplatePart, Token, TokenKind};

/// A fragment of generated code. `ModuleId` is replaced by the JSON-quoted
/// module id the named specifier resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    ModuleId(String),
}

/// Replace the source bytes from the keyed token's start up to `end` with `pieces`.
/// A rewrite whose `end` equals its start is a pure insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub end: usize,
    pub pieces: Vec<Piece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Import,
    ReExport,
    Require,
    DynamicImport,
    Runtime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub specifier: String,
    pub offset: usize,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Specifier of the automatic JSX runtime, e.g. `react/jsx-runtime`.
    pub jsx_runtime: String,
    /// Set for the entry module when `renderAsync` should be re-exported from
    /// the canonical renderer.
    pub inject_render: Option<String>,
    /// `file://` URL exposed through `import.meta.url`.
    pub file_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    pub dependencies: Vec<Dependency>,
    pub rewrites: BTreeMap<usize, Rewrite>,
    /// Exported name paired with the expression its getter returns.
    pub exports: Vec<(String, String)>,
    pub header: Vec<Piece>,
    pub is_esm: bool,
    pub has_jsx: bool,
    pub uses_import_meta: bool,
}

impl ModuleAnalysis {
    pub fn exports_name(&self, name: &str) -> bool {
        self.exports.iter().any(|(exported, _)| exported == name)
    }
}

pub fn analyze(
    tokens: &[Token],
    src: &str,
    options: &AnalyzeOptions,
) -> Result<ModuleAnalysis, SyntaxError> {
    let mut analyzer = Analyzer {
        src,
        sig: tokens.iter().filter(|t| !t.is_comment()).collect(),
        analysis: ModuleAnalysis::default(),
        imports: 0,
        reexports: 0,
    };
    analyzer.scan_statements()?;
    analyzer.scan_calls(tokens);
    analyzer.build_header(options);
    Ok(analyzer.analysis)
}

struct Analyzer<'a> {
    src: &'a str,
    sig: Vec<&'a Token>,
    analysis: ModuleAnalysis,
    imports: usize,
    reexports: usize,
}

impl<'a> Analyzer<'a> {
    fn text(&self, i: usize) -> &'a str {
        self.sig.get(i).map(|t| t.text(self.src)).unwrap_or("")
    }

    fn is_punct(&self, i: usize, value: &str) -> bool {
        self.sig.get(i).map(|t| t.is_punct(self.src, value)).unwrap_or(false)
    }

    fn is_ident(&self, i: usize, value: &str) -> bool {
        self.sig.get(i).map(|t| t.is_ident(self.src, value)).unwrap_or(false)
    }

    fn is_any_ident(&self, i: usize) -> bool {
        matches!(self.sig.get(i).map(|t| &t.kind), Some(TokenKind::Ident))
    }

    fn is_str(&self, i: usize) -> bool {
        matches!(self.sig.get(i).map(|t| &t.kind), Some(TokenKind::Str))
    }

    fn offset(&self, i: usize) -> usize {
        self.sig
            .get(i)
            .map(|t| t.start)
            .unwrap_or_else(|| self.src.len())
    }

    fn error(&self, i: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            offset: self.offset(i),
        }
    }

    fn found(&self, i: usize) -> String {
        match self.sig.get(i) {
            Some(t) => format!("{:?}", t.text(self.src)),
            None => "end of file".to_string(),
        }
    }

    fn expect_ident(&self, i: usize, value: &str) -> Result<(), SyntaxError> {
        if self.is_ident(i, value) {
            Ok(())
        } else {
            Err(self.error(i, format!("Expected {:?} but found {}", value, self.found(i))))
        }
    }

    fn string_value(&self, i: usize) -> Result<String, SyntaxError> {
        if !self.is_str(i) {
            return Err(self.error(i, format!("Expected string but found {}", self.found(i))));
        }
        Ok(unquote(self.text(i)))
    }

    /// Identifier or string literal used as an import/export name.
    fn module_export_name(&self, i: usize) -> Result<String, SyntaxError> {
        if self.is_any_ident(i) {
            Ok(self.text(i).to_string())
        } else {
            self.string_value(i)
        }
    }

    fn find_matching(&self, i: usize) -> Result<usize, SyntaxError> {
        let mut depth = 0usize;
        let mut k = i;
        while k < self.sig.len() {
            match self.text(k) {
                "{" | "(" | "[" if matches!(self.sig[k].kind, TokenKind::Punct) => depth += 1,
                "}" | ")" | "]" if matches!(self.sig[k].kind, TokenKind::Punct) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(k);
                    }
                }
                _ => {}
            }
            k += 1;
        }
        Err(self.error(i, "Unexpected end of file"))
    }

    fn skip_semicolon(&self, i: usize) -> usize {
        if self.is_punct(i, ";") {
            i + 1
        } else {
            i
        }
    }

    /// Skip `with { type: "json" }` / `assert { ... }` import attributes.
    fn skip_attributes(&self, i: usize) -> Result<usize, SyntaxError> {
        if (self.is_ident(i, "with") || self.is_ident(i, "assert")) && self.is_punct(i + 1, "{") {
            return Ok(self.find_matching(i + 1)? + 1);
        }
        Ok(i)
    }

    fn newline_before(&self, i: usize) -> bool {
        if i == 0 {
            return false;
        }
        self.src[self.sig[i - 1].end..self.sig[i].start].contains('\n')
    }

    fn rewrite(&mut self, first: usize, last_exclusive: usize, pieces: Vec<Piece>) {
        let start = self.offset(first);
        let end = self.sig[last_exclusive - 1].end;
        self.analysis.rewrites.insert(start, Rewrite { end, pieces });
    }

    fn insert(&mut self, at: usize, text: &str) {
        let offset = self.offset(at);
        self.analysis.rewrites.insert(
            offset,
            Rewrite {
                end: offset,
                pieces: vec![Piece::Text(text.to_string())],
            },
        );
    }

    fn depend(&mut self, specifier: &str, offset: usize, kind: DependencyKind) {
        self.analysis.dependencies.push(Dependency {
            specifier: specifier.to_string(),
            offset,
            kind,
        });
    }

    fn export(&mut self, name: impl Into<String>, getter: impl Into<String>) {
        self.analysis.exports.push((name.into(), getter.into()));
    }

    fn scan_statements(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0i32;
        let mut i = 0;
        while i < self.sig.len() {
            let token = self.sig[i];
            match &token.kind {
                TokenKind::Punct => match token.text(self.src) {
                    "{" | "(" | "[" => depth += 1,
                    "}" | ")" | "]" => depth -= 1,
                    _ => {}
                },
                TokenKind::Ident if depth == 0 && !self.follows_dot(i) => {
                    match token.text(self.src) {
                        "import" if !self.is_punct(i + 1, "(") && !self.is_punct(i + 1, ".") => {
                            i = self.parse_import(i)?;
                            self.analysis.is_esm = true;
                            continue;
                        }
                        "export" => {
                            i = self.parse_export(i)?;
                            self.analysis.is_esm = true;
                            continue;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    fn follows_dot(&self, i: usize) -> bool {
        i > 0 && (self.is_punct(i - 1, ".") || self.is_punct(i - 1, "?."))
    }

    fn parse_import(&mut self, start: usize) -> Result<usize, SyntaxError> {
        let mut j = start + 1;

        if self.is_str(j) {
            let specifier = self.string_value(j)?;
            self.depend(&specifier, self.offset(j), DependencyKind::Import);
            j = self.skip_attributes(j + 1)?;
            j = self.skip_semicolon(j);
            self.rewrite(
                start,
                j,
                vec![
                    Piece::Text("require(".into()),
                    Piece::ModuleId(specifier),
                    Piece::Text(");".into()),
                ],
            );
            return Ok(j);
        }

        let mut default = None;
        let mut namespace = None;
        let mut named: Vec<(String, String)> = Vec::new();

        if self.is_any_ident(j) && !self.is_ident(j, "from") {
            default = Some(self.text(j).to_string());
            j += 1;
            if self.is_punct(j, ",") {
                j += 1;
            }
        }

        if self.is_punct(j, "*") {
            self.expect_ident(j + 1, "as")?;
            if !self.is_any_ident(j + 2) {
                return Err(self.error(j + 2, format!("Expected identifier but found {}", self.found(j + 2))));
            }
            namespace = Some(self.text(j + 2).to_string());
            j += 3;
        } else if self.is_punct(j, "{") {
            j += 1;
            loop {
                if self.is_punct(j, "}") {
                    j += 1;
                    break;
                }
                let imported = self.module_export_name(j)?;
                j += 1;
                let local = if self.is_ident(j, "as") {
                    if !self.is_any_ident(j + 1) {
                        return Err(self.error(j + 1, format!("Expected identifier but found {}", self.found(j + 1))));
                    }
                    j += 2;
                    self.text(j - 1).to_string()
                } else {
                    imported.clone()
                };
                named.push((imported, local));
                if self.is_punct(j, ",") {
                    j += 1;
                } else if !self.is_punct(j, "}") {
                    return Err(self.error(j, format!("Expected \"}}\" but found {}", self.found(j))));
                }
            }
        }

        self.expect_ident(j, "from")?;
        let specifier_index = j + 1;
        let specifier = self.string_value(specifier_index)?;
        j = self.skip_attributes(specifier_index + 1)?;
        j = self.skip_semicolon(j);

        self.depend(&specifier, self.offset(specifier_index), DependencyKind::Import);

        let binding = format!("__import_{}", self.imports);
        self.imports += 1;

        let mut bindings = String::new();
        if let Some(local) = default {
            bindings.push_str(&format!(" var {} = {}.default;", local, binding));
        }
        if let Some(local) = namespace {
            bindings.push_str(&format!(" var {} = {};", local, binding));
        }
        for (imported, local) in named {
            bindings.push_str(&format!(" var {} = {}{};", local, binding, accessor(&imported)));
        }

        self.rewrite(
            start,
            j,
            vec![
                Piece::Text(format!("var {} = __preview_interop(require(", binding)),
                Piece::ModuleId(specifier),
                Piece::Text(format!("));{}", bindings)),
            ],
        );
        Ok(j)
    }

    fn parse_export(&mut self, start: usize) -> Result<usize, SyntaxError> {
        let j = start + 1;
        match self.text(j) {
            "default" if self.is_any_ident(j) => self.parse_export_default(start),
            "var" | "let" | "const" if self.is_any_ident(j) => {
                self.rewrite(start, start + 1, Vec::new());
                let mut names = Vec::new();
                self.collect_declarators(j + 1, &mut names)?;
                for name in names {
                    self.export(name.clone(), name);
                }
                Ok(j)
            }
            "function" | "class" | "async" if self.is_any_ident(j) => {
                let mut name_index = j + 1;
                if self.is_ident(j, "async") {
                    self.expect_ident(j + 1, "function")?;
                    name_index += 1;
                }
                if self.is_punct(name_index, "*") {
                    name_index += 1;
                }
                if !self.is_any_ident(name_index) {
                    return Err(self.error(name_index, format!("Expected identifier but found {}", self.found(name_index))));
                }
                self.rewrite(start, start + 1, Vec::new());
                let name = self.text(name_index).to_string();
                self.export(name.clone(), name);
                Ok(j)
            }
            "{" => self.parse_export_clause(start),
            "*" => self.parse_export_star(start),
            _ => Err(self.error(j, format!("Unexpected {} after \"export\"", self.found(j)))),
        }
    }

    fn parse_export_default(&mut self, start: usize) -> Result<usize, SyntaxError> {
        let default_index = start + 1;
        let k = default_index + 1;

        let is_async_function = self.is_ident(k, "async")
            && self.is_ident(k + 1, "function")
            && !self.newline_before(k + 1);
        let keyword = if is_async_function { k + 1 } else { k };

        if self.is_ident(keyword, "function") || self.is_ident(keyword, "class") {
            let mut name_index = keyword + 1;
            if self.is_ident(keyword, "function") && self.is_punct(name_index, "*") {
                name_index += 1;
            }
            self.rewrite(start, default_index + 1, Vec::new());

            let named = self.is_any_ident(name_index)
                && !(self.is_ident(keyword, "class") && self.is_ident(name_index, "extends"));
            if named {
                let name = self.text(name_index).to_string();
                self.export("default", name);
            } else {
                self.insert(name_index, "__preview_default ");
                self.export("default", "__preview_default");
            }
            return Ok(default_index + 1);
        }

        self.rewrite(
            start,
            default_index + 1,
            vec![Piece::Text("var __preview_default =".into())],
        );
        self.export("default", "__preview_default");
        Ok(default_index + 1)
    }

    fn parse_export_clause(&mut self, start: usize) -> Result<usize, SyntaxError> {
        let mut j = start + 2;
        let mut specifiers: Vec<(String, String)> = Vec::new();
        loop {
            if self.is_punct(j, "}") {
                j += 1;
                break;
            }
            let local = self.module_export_name(j)?;
            j += 1;
            let exported = if self.is_ident(j, "as") {
                let name = self.module_export_name(j + 1)?;
                j += 2;
                name
            } else {
                local.clone()
            };
            specifiers.push((local, exported));
            if self.is_punct(j, ",") {
                j += 1;
            } else if !self.is_punct(j, "}") {
                return Err(self.error(j, format!("Expected \"}}\" but found {}", self.found(j))));
            }
        }

        if self.is_ident(j, "from") {
            let specifier_index = j + 1;
            let specifier = self.string_value(specifier_index)?;
            j = self.skip_attributes(specifier_index + 1)?;
            j = self.skip_semicolon(j);
            self.depend(&specifier, self.offset(specifier_index), DependencyKind::ReExport);

            let binding = format!("__reexport_{}", self.reexports);
            self.reexports += 1;
            for (imported, exported) in specifiers {
                self.export(exported, format!("{}{}", binding, accessor(&imported)));
            }
            self.rewrite(
                start,
                j,
                vec![
                    Piece::Text(format!("var {} = __preview_interop(require(", binding)),
                    Piece::ModuleId(specifier),
                    Piece::Text("));".into()),
                ],
            );
            return Ok(j);
        }

        j = self.skip_semicolon(j);
        for (local, exported) in specifiers {
            self.export(exported, local);
        }
        self.rewrite(start, j, Vec::new());
        Ok(j)
    }

    fn parse_export_star(&mut self, start: usize) -> Result<usize, SyntaxError> {
        let mut j = start + 2;
        let namespace = if self.is_ident(j, "as") {
            let name = self.module_export_name(j + 1)?;
            j += 2;
            Some(name)
        } else {
            None
        };
        self.expect_ident(j, "from")?;
        let specifier_index = j + 1;
        let specifier = self.string_value(specifier_index)?;
        j = self.skip_attributes(specifier_index + 1)?;
        j = self.skip_semicolon(j);
        self.depend(&specifier, self.offset(specifier_index), DependencyKind::ReExport);

        let binding = format!("__reexport_{}", self.reexports);
        self.reexports += 1;

        let pieces = match namespace {
            Some(name) => {
                self.export(name, binding.clone());
                vec![
                    Piece::Text(format!("var {} = __preview_interop(require(", binding)),
                    Piece::ModuleId(specifier),
                    Piece::Text("));".into()),
                ]
            }
            None => vec![
                Piece::Text(format!("var {} = require(", binding)),
                Piece::ModuleId(specifier),
                Piece::Text(format!("); __preview_reexport(exports, {});", binding)),
            ],
        };
        self.rewrite(start, j, pieces);
        Ok(j)
    }

    /// Collect the names bound by a `var`/`let`/`const` declaration list.
    fn collect_declarators(&self, mut k: usize, names: &mut Vec<String>) -> Result<(), SyntaxError> {
        loop {
            k = self.binding_target(k, names)?;

            let first = k;
            let mut depth = 0usize;
            let mut more = false;
            while k < self.sig.len() {
                let token = self.sig[k];
                if matches!(token.kind, TokenKind::Punct) {
                    match token.text(self.src) {
                        "{" | "(" | "[" => depth += 1,
                        "}" | ")" | "]" => {
                            if depth == 0 {
                                break;
                            }
                            depth -= 1;
                        }
                        "," if depth == 0 => {
                            more = true;
                            k += 1;
                            break;
                        }
                        ";" if depth == 0 => break,
                        _ => {}
                    }
                } else if depth == 0 && k > first && self.starts_statement(k) {
                    break;
                }
                k += 1;
            }

            if !more {
                return Ok(());
            }
        }
    }

    /// A token on a new line that cannot continue the previous expression.
    fn starts_statement(&self, k: usize) -> bool {
        if !self.newline_before(k) || !self.is_any_ident(k) {
            return false;
        }
        if matches!(self.text(k), "instanceof" | "in" | "of") {
            return false;
        }
        let previous = self.sig[k - 1];
        match &previous.kind {
            TokenKind::Punct => matches!(previous.text(self.src), ")" | "]" | "}" | "++" | "--"),
            TokenKind::Comment => false,
            _ => true,
        }
    }

    fn binding_target(&self, k: usize, names: &mut Vec<String>) -> Result<usize, SyntaxError> {
        if self.is_punct(k, "{") || self.is_punct(k, "[") {
            return self.collect_pattern(k, names);
        }
        if self.is_any_ident(k) {
            names.push(self.text(k).to_string());
            return Ok(k + 1);
        }
        Err(self.error(k, format!("Expected identifier but found {}", self.found(k))))
    }

    fn collect_pattern(&self, open: usize, names: &mut Vec<String>) -> Result<usize, SyntaxError> {
        let object = self.is_punct(open, "{");
        let close = if object { "}" } else { "]" };
        let mut k = open + 1;

        loop {
            if k >= self.sig.len() {
                return Err(self.error(open, "Unexpected end of file in binding pattern"));
            }
            if self.is_punct(k, close) {
                return Ok(k + 1);
            }
            if self.is_punct(k, ",") {
                k += 1;
                continue;
            }
            if self.is_punct(k, "...") {
                k = self.binding_target(k + 1, names)?;
                continue;
            }

            if object {
                if self.is_punct(k, "[") {
                    k = self.find_matching(k)? + 1;
                    if !self.is_punct(k, ":") {
                        return Err(self.error(k, format!("Expected \":\" but found {}", self.found(k))));
                    }
                    k = self.binding_target(k + 1, names)?;
                } else if self.is_punct(k + 1, ":") {
                    k = self.binding_target(k + 2, names)?;
                } else if self.is_any_ident(k) {
                    names.push(self.text(k).to_string());
                    k += 1;
                } else {
                    return Err(self.error(k, format!("Unexpected {} in binding pattern", self.found(k))));
                }
            } else {
                k = self.binding_target(k, names)?;
            }

            if self.is_punct(k, "=") {
                k = self.skip_default(k + 1);
            }
        }
    }

    fn skip_default(&self, mut k: usize) -> usize {
        let mut depth = 0usize;
        while k < self.sig.len() {
            let token = self.sig[k];
            if matches!(token.kind, TokenKind::Punct) {
                match token.text(self.src) {
                    "{" | "(" | "[" => depth += 1,
                    "}" | ")" | "]" => {
                        if depth == 0 {
                            return k;
                        }
                        depth -= 1;
                    }
                    "," if depth == 0 => return k,
                    _ => {}
                }
            }
            k += 1;
        }
        k
    }

    /// Find literal `require("x")`, `import("x")` and `import.meta` at any
    /// nesting level, including template substitutions and JSX containers.
    fn scan_calls(&mut self, tokens: &'a [Token]) {
        let src = self.src;
        let sig: Vec<&'a Token> = tokens.iter().filter(|t| !t.is_comment()).collect();
        let text = |i: usize| sig.get(i).map(|t| t.text(src)).unwrap_or("");
        let kind_at = |i: usize| sig.get(i).map(|t| &t.kind);

        for n in 0..sig.len() {
            let token: &'a Token = sig[n];
            match &token.kind {
                TokenKind::Template(parts) => {
                    for part in parts {
                        if let TemplatePart::Expr { tokens, .. } = part {
                            self.scan_calls(tokens);
                        }
                    }
                }
                TokenKind::Jsx(element) => {
                    self.analysis.has_jsx = true;
                    let mut nested: Vec<&'a JsxExpr> = Vec::new();
                    element.for_each_expr(&mut |expr| nested.push(expr));
                    for expr in nested {
                        self.scan_calls(&expr.tokens);
                    }
                }
                TokenKind::Ident => {
                    let after_dot = n > 0 && matches!(text(n - 1), "." | "?.")
                        && matches!(kind_at(n - 1), Some(TokenKind::Punct));
                    if after_dot {
                        continue;
                    }
                    let literal_call = text(n + 1) == "("
                        && matches!(kind_at(n + 2), Some(TokenKind::Str))
                        && text(n + 3) == ")";

                    match token.text(self.src) {
                        "require" if literal_call => {
                            let literal = sig[n + 2];
                            let specifier = unquote(literal.text(self.src));
                            self.depend(&specifier, literal.start, DependencyKind::Require);
                            self.analysis.rewrites.insert(
                                literal.start,
                                Rewrite {
                                    end: literal.end,
                                    pieces: vec![Piece::ModuleId(specifier)],
                                },
                            );
                        }
                        "import" if literal_call => {
                            let literal = sig[n + 2];
                            let specifier = unquote(literal.text(self.src));
                            self.depend(&specifier, literal.start, DependencyKind::DynamicImport);
                            self.analysis.rewrites.insert(
                                token.start,
                                Rewrite {
                                    end: sig[n + 3].end,
                                    pieces: vec![
                                        Piece::Text(
                                            "Promise.resolve().then(() => __preview_interop(require("
                                                .into(),
                                        ),
                                        Piece::ModuleId(specifier),
                                        Piece::Text(")))".into()),
                                    ],
                                },
                            );
                        }
                        "import" if text(n + 1) == "." && text(n + 2) == "meta" => {
                            self.analysis.uses_import_meta = true;
                            self.analysis.rewrites.insert(
                                token.start,
                                Rewrite {
                                    end: sig[n + 2].end,
                                    pieces: vec![Piece::Text("__preview_import_meta".into())],
                                },
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    fn build_header(&mut self, options: &AnalyzeOptions) {
        let mut header = Vec::new();

        if self.analysis.uses_import_meta {
            header.push(Piece::Text(format!(
                "var __preview_import_meta = {{ url: {} }}; ",
                json_string(&options.file_url)
            )));
        }

        if self.analysis.has_jsx {
            self.depend(&options.jsx_runtime, 0, DependencyKind::Runtime);
            header.push(Piece::Text("var __jsx_runtime = require(".into()));
            header.push(Piece::ModuleId(options.jsx_runtime.clone()));
            header.push(Piece::Text("); ".into()));
        }

        if let Some(render) = &options.inject_render {
            if self.analysis.is_esm && !self.analysis.exports_name("renderAsync") {
                self.depend(render, 0, DependencyKind::Runtime);
                header.push(Piece::Text("var __preview_render = require(".into()));
                header.push(Piece::ModuleId(render.clone()));
                header.push(Piece::Text("); ".into()));
                self.export("renderAsync", "__preview_render.renderAsync");
            }
        }

        if self.analysis.is_esm {
            let getters: Vec<String> = self
                .analysis
                .exports
                .iter()
                .map(|(name, getter)| format!("{}: () => {}", property_key(name), getter))
                .collect();
            header.push(Piece::Text(format!(
                "__preview_export(exports, {{ {} }});",
                getters.join(", ")
            )));
        }

        self.analysis.header = header;
    }
}

/// Member access for an export name: `.name` or `["name"]`.
fn accessor(name: &str) -> String {
    if is_identifier(name) {
        format!(".{}", name)
    } else {
        format!("[{}]", json_string(name))
    }
}

/// Value of a string literal token, including its quotes.
pub fn unquote(literal: &str) -> String {
    let inner = if literal.len() >= 2 {
        &literal[1..literal.len() - 1]
    } else {
        literal
    };
    if !inner.contains('\\') {
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn run(src: &str) -> ModuleAnalysis {
        let tokens = tokenize(src, true).unwrap();
        analyze(
            &tokens,
            src,
            &AnalyzeOptions {
                jsx_runtime: "react/jsx-runtime".into(),
                inject_render: None,
                file_url: "file:///p/emails/a.jsx".into(),
            },
        )
        .unwrap()
    }

    fn specifiers(analysis: &ModuleAnalysis) -> Vec<&str> {
        analysis
            .dependencies
            .iter()
            .map(|d| d.specifier.as_str())
            .collect()
    }

    #[test]
    fn test_import_forms() {
        let analysis = run(
            r#"import React, { useState as useS, "x-y" as xy } from "react";
import * as utils from './utils';
import "./side-effect.js";"#,
        );
        assert!(analysis.is_esm);
        assert_eq!(specifiers(&analysis), vec!["react", "./utils", "./side-effect.js"]);
        assert_eq!(analysis.rewrites.len(), 3);

        let first = analysis.rewrites.values().next().unwrap();
        let Piece::Text(bindings) = &first.pieces[2] else {
            panic!("expected text");
        };
        assert!(bindings.contains("var React = __import_0.default;"));
        assert!(bindings.contains("var useS = __import_0.useState;"));
        assert!(bindings.contains("var xy = __import_0[\"x-y\"];"));
    }

    #[test]
    fn test_export_names() {
        let analysis = run(
            r#"export const a = 1, { b, c: [d, ...e] } = obj
export function f() {}
export class G {}
let h = 2;
export { h as default, h };"#,
        );
        let names: Vec<&str> = analysis.exports.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "e", "f", "G", "default", "h"]);
        assert!(analysis.exports.contains(&("default".to_string(), "h".to_string())));
    }

    #[test]
    fn test_declarator_stops_at_statement_boundary() {
        let analysis = run("export const a = foo\nbar(1, 2)\n");
        let names: Vec<&str> = analysis.exports.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_default_export_forms() {
        let analysis = run("export default function () { return null; }");
        assert_eq!(
            analysis.exports,
            vec![("default".to_string(), "__preview_default".to_string())]
        );
        // removal of `export default` plus insertion of the name
        assert_eq!(analysis.rewrites.len(), 2);

        let analysis = run("export default function Email() {}");
        assert_eq!(analysis.exports[0].1, "Email");

        let analysis = run("export default () => null;");
        let rewrite = analysis.rewrites.get(&0).unwrap();
        assert_eq!(
            rewrite.pieces,
            vec![Piece::Text("var __preview_default =".into())]
        );
    }

    #[test]
    fn test_reexports() {
        let analysis = run(
            r#"export * from "./a";
export * as b from "./b";
export { default as C, d } from "./c";"#,
        );
        assert_eq!(specifiers(&analysis), vec!["./a", "./b", "./c"]);
        assert!(analysis
            .exports
            .contains(&("C".to_string(), "__reexport_2.default".to_string())));
        assert!(analysis
            .exports
            .contains(&("b".to_string(), "__reexport_1".to_string())));
    }

    #[test]
    fn test_require_and_dynamic_import() {
        let analysis = run(
            r#"const x = require("./x");
const el = <div>{require('./y').label}</div>;
const lazy = () => import("./z");
const meta = import.meta.url;"#,
        );
        assert!(!analysis.is_esm);
        assert!(analysis.has_jsx);
        assert!(analysis.uses_import_meta);
        assert_eq!(
            specifiers(&analysis),
            vec!["./x", "./y", "./z", "react/jsx-runtime"]
        );
    }

    #[test]
    fn test_render_injection_header() {
        let src = "export default () => null;";
        let tokens = tokenize(src, true).unwrap();
        let analysis = analyze(
            &tokens,
            src,
            &AnalyzeOptions {
                jsx_runtime: "react/jsx-runtime".into(),
                inject_render: Some("@preview/render".into()),
                file_url: String::new(),
            },
        )
        .unwrap();
        assert!(analysis.exports_name("renderAsync"));
        assert!(analysis
            .header
            .contains(&Piece::ModuleId("@preview/render".into())));
    }

    #[test]
    fn test_malformed_import_is_syntax_error() {
        let tokens = tokenize("import { a from './a';", true).unwrap();
        let result = analyze(&tokens, "import { a from './a';", &AnalyzeOptions::default());
        assert!(result.is_err());
    }
}
