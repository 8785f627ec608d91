//! TypeScript type stripping.
//!
//! Type-only syntax is overwritten with whitespace of the same byte length,
//! so offsets into the stripped text are offsets into the original file and
//! the source map needs no extra step. Imports whose bindings end up unused
//! once types are gone are dropped the same way.

use std::collections::HashSet;

use super::jsx::JsxElement;
use super::lexer::{tokenize_typescript, SyntaxError, TemplatePart, Token, TokenKind};

/// Keywords that never end an operand.
const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "export", "extends", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "let", "new", "of", "return", "satisfies",
    "switch", "throw", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Type operators written before their operand.
const TYPE_PREFIXES: &[&str] = &[
    "keyof", "typeof", "readonly", "unique", "infer", "asserts", "abstract", "new",
];

/// Punctuators allowed between the brackets of a type argument list.
const ANGLE_PUNCT: &[&str] = &[",", ".", "|", "&", ":", "?", "=", "=>", "...", "-"];

const CLASS_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "override", "abstract", "declare", "static",
    "async", "get", "set", "accessor",
];

const PARAMETER_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

/// Remove TypeScript syntax from `src`, keeping every byte offset intact.
pub fn strip_types(src: &str, jsx: bool) -> Result<String, SyntaxError> {
    let tokens = tokenize_typescript(src, jsx)?;
    let mut output = Output::default();
    Walker::new(src, &tokens, &mut output).run()?;
    output.elide_unused(src, &tokens);
    Ok(output.apply(src))
}

struct ImportBinding {
    local: String,
    start: usize,
    end: usize,
    /// Inside `{ ... }`, where a single specifier can go on its own.
    named: bool,
}

struct ImportStatement {
    start: usize,
    end: usize,
    bindings: Vec<ImportBinding>,
    had_specifiers: bool,
}

struct ExportSpecifier {
    local: String,
    start: usize,
    end: usize,
}

#[derive(Default)]
struct Output {
    blanks: Vec<(usize, usize)>,
    imports: Vec<ImportStatement>,
    /// Names declared by `type` and `interface`.
    type_names: HashSet<String>,
    /// Local `export { ... }` specifiers, dropped if they name a type.
    exported: Vec<ExportSpecifier>,
}

impl Output {
    fn blank(&mut self, start: usize, end: usize) {
        if start < end {
            self.blanks.push((start, end));
        }
    }

    fn is_blank(&self, offset: usize) -> bool {
        self.blanks.iter().any(|&(start, end)| start <= offset && offset < end)
    }

    fn in_import(&self, offset: usize) -> bool {
        self.imports
            .iter()
            .any(|import| import.start <= offset && offset < import.end)
    }

    fn elide_unused(&mut self, src: &str, tokens: &[Token]) {
        for export in std::mem::take(&mut self.exported) {
            if self.type_names.contains(&export.local) {
                self.blank(export.start, export.end);
            }
        }

        let mut used = HashSet::new();
        self.collect_used(src, tokens, &mut used);
        let used: HashSet<String> = used.into_iter().map(str::to_string).collect();

        for import in std::mem::take(&mut self.imports) {
            let unused: Vec<&ImportBinding> = import
                .bindings
                .iter()
                .filter(|binding| !used.contains(&binding.local))
                .collect();
            let nothing_left = if import.bindings.is_empty() {
                import.had_specifiers
            } else {
                unused.len() == import.bindings.len()
            };
            if nothing_left {
                self.blank(import.start, import.end);
                continue;
            }
            for binding in unused.into_iter().filter(|binding| binding.named) {
                self.blank(binding.start, binding.end);
            }
        }
    }

    /// Identifiers that survive stripping, outside import statements.
    fn collect_used<'a>(&self, src: &'a str, tokens: &'a [Token], used: &mut HashSet<&'a str>) {
        for token in tokens {
            if self.is_blank(token.start) {
                continue;
            }
            match &token.kind {
                TokenKind::Ident if !self.in_import(token.start) => {
                    used.insert(token.text(src));
                }
                TokenKind::Template(parts) => {
                    for part in parts {
                        if let TemplatePart::Expr { tokens, .. } = part {
                            self.collect_used(src, tokens, used);
                        }
                    }
                }
                TokenKind::Jsx(element) => {
                    let element: &'a JsxElement = element;
                    element.for_each_name(&mut |name| {
                        if let Some(root) = name.text.split('.').next() {
                            used.insert(root);
                        }
                    });
                    let mut nested = Vec::new();
                    element.for_each_expr(&mut |expr| nested.push(expr));
                    for expr in nested {
                        self.collect_used(src, &expr.tokens, used);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply(mut self, src: &str) -> String {
        self.blanks.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.blanks.len());
        for (start, end) in self.blanks {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut out = String::with_capacity(src.len());
        let mut next = 0;
        for (offset, c) in src.char_indices() {
            while next < merged.len() && merged[next].1 <= offset {
                next += 1;
            }
            let blank = next < merged.len() && merged[next].0 <= offset;
            if !blank || matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                out.push(c);
                continue;
            }
            // whitespace of the same encoded length
            match c.len_utf8() {
                1 => out.push(' '),
                2 => out.push('\u{a0}'),
                3 => out.push('\u{3000}'),
                _ => out.push_str("\u{a0}\u{a0}"),
            }
        }
        out
    }
}

struct Walker<'a, 'o> {
    src: &'a str,
    sig: Vec<&'a Token>,
    out: &'o mut Output,
}

impl<'a, 'o> Walker<'a, 'o> {
    fn new(src: &'a str, tokens: &'a [Token], out: &'o mut Output) -> Self {
        Self {
            src,
            sig: tokens.iter().filter(|t| !t.is_comment()).collect(),
            out,
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        self.scan(0, self.sig.len())
    }

    fn nested(&mut self, tokens: &'a [Token]) -> Result<(), SyntaxError> {
        Walker::new(self.src, tokens, &mut *self.out).run()
    }

    // token queries

    fn text(&self, i: usize) -> &'a str {
        self.sig.get(i).copied().map(|t| t.text(self.src)).unwrap_or("")
    }

    fn kind(&self, i: usize) -> Option<&'a TokenKind> {
        self.sig.get(i).copied().map(|t| &t.kind)
    }

    fn punct(&self, i: usize, value: &str) -> bool {
        self.sig.get(i).map(|t| t.is_punct(self.src, value)).unwrap_or(false)
    }

    fn ident(&self, i: usize, value: &str) -> bool {
        self.sig.get(i).map(|t| t.is_ident(self.src, value)).unwrap_or(false)
    }

    fn is_any_ident(&self, i: usize) -> bool {
        matches!(self.kind(i), Some(TokenKind::Ident))
    }

    fn is_str(&self, i: usize) -> bool {
        matches!(self.kind(i), Some(TokenKind::Str))
    }

    fn start(&self, i: usize) -> usize {
        self.sig.get(i).map(|t| t.start).unwrap_or(self.src.len())
    }

    fn end(&self, i: usize) -> usize {
        self.sig.get(i).map(|t| t.end).unwrap_or(self.src.len())
    }

    fn newline_before(&self, i: usize) -> bool {
        match (i.checked_sub(1).and_then(|p| self.sig.get(p)), self.sig.get(i)) {
            (Some(prev), Some(token)) => self.src[prev.end..token.start].contains('\n'),
            _ => false,
        }
    }

    /// The closest earlier token that has not been stripped.
    fn prev(&self, i: usize) -> Option<usize> {
        (0..i).rev().find(|&j| !self.out.is_blank(self.sig[j].start))
    }

    fn operand_end(&self, i: usize) -> bool {
        match self.kind(i) {
            Some(TokenKind::Ident) => !KEYWORDS.contains(&self.text(i)),
            Some(TokenKind::Punct) => matches!(self.text(i), ")" | "]" | "}"),
            Some(_) => !matches!(self.kind(i), Some(TokenKind::Comment)),
            None => false,
        }
    }

    fn is_name(&self, i: usize) -> bool {
        self.is_any_ident(i) && !KEYWORDS.contains(&self.text(i))
    }

    fn statement_start(&self, i: usize) -> bool {
        let Some(prev) = self.prev(i) else {
            return true;
        };
        self.src[self.sig[prev].end..self.sig[i].start].contains('\n')
            || (matches!(self.kind(prev), Some(TokenKind::Punct))
                && matches!(self.text(prev), ";" | "{" | "}"))
            || self.ident(prev, "export")
            || self.ident(prev, "default")
    }

    /// Start of a declaration at `i`, widened over `export` and `export default`.
    fn declaration_start(&self, i: usize) -> usize {
        if i >= 2 && self.ident(i - 1, "default") && self.ident(i - 2, "export") {
            self.start(i - 2)
        } else if i >= 1 && self.ident(i - 1, "export") {
            self.start(i - 1)
        } else {
            self.start(i)
        }
    }

    fn starts_type(&self, i: usize, to: usize) -> bool {
        if i >= to {
            return false;
        }
        match self.kind(i) {
            Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template(_)) => {
                true
            }
            Some(TokenKind::Punct) => {
                matches!(self.text(i), "(" | "[" | "{" | "<" | "-" | "|" | "&")
            }
            _ => false,
        }
    }

    fn found(&self, i: usize) -> String {
        match self.sig.get(i) {
            Some(t) => format!("{:?}", t.text(self.src)),
            None => "end of file".to_string(),
        }
    }

    fn error(&self, i: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            offset: self.start(i),
        }
    }

    fn expected(&self, i: usize, what: &str) -> SyntaxError {
        self.error(i, format!("Expected {:?} but found {}", what, self.found(i)))
    }

    fn blank(&mut self, start: usize, end: usize) {
        self.out.blank(start, end);
    }

    fn blank_tokens(&mut self, first: usize, last: usize) {
        self.out.blank(self.start(first), self.end(last));
    }

    // brackets

    /// Index of the bracket closing the one at `open`.
    fn matching(&self, open: usize, to: usize) -> Option<usize> {
        let mut depth = 0usize;
        for j in open..to.min(self.sig.len()) {
            if !matches!(self.sig[j].kind, TokenKind::Punct) {
                continue;
            }
            match self.text(j) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Index of the token holding the `>` that closes the `<` at `open`, and
    /// the offset just past that `>`. A `>>` or `>=` may close it part way.
    fn angle_close(&self, open: usize, to: usize) -> Option<(usize, usize)> {
        let mut depth = 0usize;
        let mut j = open;
        while j < to {
            let token = self.sig[j];
            match &token.kind {
                TokenKind::Punct => {
                    let text = token.text(self.src);
                    let closers = text.bytes().take_while(|b| *b == b'>').count();
                    if text == "<" {
                        depth += 1;
                    } else if closers > 0 {
                        if closers >= depth {
                            return Some((j, token.start + depth));
                        }
                        depth -= closers;
                    } else if matches!(text, "(" | "[" | "{") {
                        j = self.matching(j, to)?;
                    } else if !ANGLE_PUNCT.contains(&text) {
                        return None;
                    }
                }
                TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template(_) => {}
                _ => return None,
            }
            j += 1;
        }
        None
    }

    /// First index at or after `from` holding a `,` outside brackets.
    fn next_comma(&self, from: usize, to: usize) -> usize {
        let mut depth = 0usize;
        let mut j = from;
        while j < to {
            if matches!(self.sig[j].kind, TokenKind::Punct) {
                match self.text(j) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    "," if depth == 0 => return j,
                    _ => {}
                }
            }
            j += 1;
        }
        to
    }

    /// Skip one type starting at `from`. Returns the index after it and the
    /// offset where it ends.
    fn skip_type(&self, from: usize, to: usize, stop_at_arrow: bool) -> (usize, usize) {
        let mut j = from;
        let mut last = from.checked_sub(1).map(|p| self.end(p)).unwrap_or(0);
        let mut operand = true;
        let mut conditional = 0usize;

        while j < to {
            let token = self.sig[j];
            let text = token.text(self.src);
            if operand {
                match &token.kind {
                    TokenKind::Ident
                        if TYPE_PREFIXES.contains(&text) && self.starts_type(j + 1, to) =>
                    {
                        j += 1;
                    }
                    TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template(_) => {
                        j += 1;
                        operand = false;
                    }
                    TokenKind::Punct => match text {
                        "(" | "[" | "{" => {
                            let Some(close) = self.matching(j, to) else {
                                break;
                            };
                            j = close + 1;
                            operand = false;
                        }
                        // type parameters of a function type
                        "<" => {
                            let Some((close, at)) = self.angle_close(j, to) else {
                                break;
                            };
                            if at != self.end(close) {
                                break;
                            }
                            j = close + 1;
                        }
                        "|" | "&" | "-" | "..." => j += 1,
                        _ => break,
                    },
                    _ => break,
                }
            } else {
                let newline = self.newline_before(j);
                match (&token.kind, text) {
                    (TokenKind::Punct, "|" | "&" | ".") => {
                        j += 1;
                        operand = true;
                    }
                    (TokenKind::Punct, "[") if !newline => {
                        let Some(close) = self.matching(j, to) else {
                            break;
                        };
                        j = close + 1;
                    }
                    (TokenKind::Punct, "<") if !newline => {
                        let Some((close, at)) = self.angle_close(j, to) else {
                            break;
                        };
                        if at != self.end(close) {
                            return (close + 1, at);
                        }
                        j = close + 1;
                    }
                    (TokenKind::Punct, "=>") if !stop_at_arrow => {
                        j += 1;
                        operand = true;
                    }
                    (TokenKind::Punct, "?") if conditional > 0 => {
                        j += 1;
                        operand = true;
                    }
                    (TokenKind::Punct, ":") if conditional > 0 => {
                        conditional -= 1;
                        j += 1;
                        operand = true;
                    }
                    (TokenKind::Ident, "is") => {
                        j += 1;
                        operand = true;
                    }
                    (TokenKind::Ident, "extends") => {
                        conditional += 1;
                        j += 1;
                        operand = true;
                    }
                    _ => break,
                }
            }
            last = self.end(j - 1);
        }
        (j, last)
    }

    // walking

    fn scan(&mut self, from: usize, to: usize) -> Result<(), SyntaxError> {
        let mut i = from;
        let mut depth = 0usize;
        let mut declaring: Option<usize> = None;

        while i < to {
            let token = self.sig[i];
            match &token.kind {
                TokenKind::Template(parts) => {
                    for part in parts {
                        if let TemplatePart::Expr { tokens, .. } = part {
                            self.nested(tokens)?;
                        }
                    }
                    i += 1;
                    continue;
                }
                TokenKind::Jsx(element) => {
                    let element: &'a JsxElement = element;
                    let mut exprs = Vec::new();
                    element.for_each_expr(&mut |expr| exprs.push(expr));
                    for expr in exprs {
                        self.nested(&expr.tokens)?;
                    }
                    i += 1;
                    continue;
                }
                TokenKind::Ident if matches!(self.text(i), "const" | "let" | "var") => {
                    if self.ident(i + 1, "enum") {
                        return Err(self.error(i + 1, "TypeScript enums are not supported"));
                    }
                    declaring = Some(depth);
                    i = self.binding(i + 1, to)?;
                    continue;
                }
                TokenKind::Punct if declaring == Some(depth) && self.text(i) == "," => {
                    i = self.binding(i + 1, to)?;
                    continue;
                }
                _ => {}
            }

            let next = self.step(i, to)?;
            if next == i + 1 && matches!(token.kind, TokenKind::Punct) {
                match self.text(i) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => {
                        depth = depth.saturating_sub(1);
                        if declaring.map_or(false, |d| depth < d) {
                            declaring = None;
                        }
                    }
                    ";" if declaring == Some(depth) => declaring = None,
                    _ => {}
                }
            }
            i = next;
        }
        Ok(())
    }

    fn step(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let token = self.sig[i];
        let text = token.text(self.src);
        match &token.kind {
            TokenKind::Ident => self.keyword(i, to, text),
            TokenKind::Punct => match text {
                "(" => self.paren(i, to),
                "<" => Ok(self.type_arguments(i, to)),
                "!" => {
                    let asserted = self
                        .prev(i)
                        .map_or(false, |p| self.end(p) == token.start && self.non_null_target(p));
                    if asserted {
                        self.blank_tokens(i, i);
                    }
                    Ok(i + 1)
                }
                _ => Ok(i + 1),
            },
            _ => Ok(i + 1),
        }
    }

    fn non_null_target(&self, i: usize) -> bool {
        self.is_name(i) || self.punct(i, ")") || self.punct(i, "]")
    }

    fn keyword(&mut self, i: usize, to: usize, text: &str) -> Result<usize, SyntaxError> {
        let at_start = self.statement_start(i);
        match text {
            "type"
                if at_start
                    && self.is_any_ident(i + 1)
                    && (self.punct(i + 2, "=") || self.punct(i + 2, "<")) =>
            {
                self.type_alias(i, to)
            }
            "interface" if at_start && self.is_any_ident(i + 1) => self.interface(i, to),
            "declare" if at_start && self.is_any_ident(i + 1) && !self.newline_before(i + 1) => {
                self.ambient(i, to)
            }
            "abstract" if self.ident(i + 1, "class") => {
                self.blank_tokens(i, i);
                Ok(i + 1)
            }
            "enum" if at_start && self.is_any_ident(i + 1) => {
                Err(self.error(i, "TypeScript enums are not supported"))
            }
            "namespace" | "module"
                if at_start
                    && (self.is_any_ident(i + 1) || self.is_str(i + 1))
                    && self.punct(i + 2, "{") =>
            {
                Err(self.error(i, "TypeScript namespaces are not supported"))
            }
            "import" if at_start && !self.punct(i + 1, "(") && !self.punct(i + 1, ".") => {
                self.import(i, to)
            }
            "export" if at_start => self.export(i, to),
            "function" => self.function(i, to),
            "class" => self.class(i, to),
            "as" | "satisfies"
                if !self.newline_before(i)
                    && self.prev(i).map_or(false, |p| self.operand_end(p))
                    && self.starts_type(i + 1, to) =>
            {
                let (next, end) = self.skip_type(i + 1, to, false);
                self.blank(self.start(i), end);
                Ok(next)
            }
            _ => Ok(i + 1),
        }
    }

    /// A binding after `const`, `let`, `var`, or a declarator comma, with
    /// its `!` and type annotation stripped.
    fn binding(&mut self, mut j: usize, to: usize) -> Result<usize, SyntaxError> {
        if self.is_any_ident(j) {
            j += 1;
        } else if self.punct(j, "{") || self.punct(j, "[") {
            let Some(close) = self.matching(j, to) else {
                return Ok(j);
            };
            self.scan(j + 1, close)?;
            j = close + 1;
        } else {
            return Ok(j);
        }
        if self.punct(j, "!") && self.punct(j + 1, ":") {
            self.blank_tokens(j, j);
            j += 1;
        }
        if self.punct(j, ":") {
            let (next, end) = self.skip_type(j + 1, to, false);
            self.blank(self.start(j), end);
            j = next;
        }
        Ok(j)
    }

    fn type_alias(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let start = self.declaration_start(i);
        self.out.type_names.insert(self.text(i + 1).to_string());
        let mut j = i + 2;
        if self.punct(j, "<") {
            let (close, _) = self
                .angle_close(j, to)
                .ok_or_else(|| self.expected(j, ">"))?;
            j = close + 1;
        }
        if !self.punct(j, "=") {
            return Err(self.expected(j, "="));
        }
        let (mut next, mut end) = self.skip_type(j + 1, to, false);
        if self.punct(next, ";") {
            end = self.end(next);
            next += 1;
        }
        self.blank(start, end);
        Ok(next)
    }

    fn interface(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let start = self.declaration_start(i);
        self.out.type_names.insert(self.text(i + 1).to_string());
        let mut j = i + 2;
        while j < to && !self.punct(j, "{") {
            j = match self.punct(j, "<").then(|| self.angle_close(j, to)).flatten() {
                Some((close, _)) => close + 1,
                None => j + 1,
            };
        }
        let close = self
            .punct(j, "{")
            .then(|| self.matching(j, to))
            .flatten()
            .ok_or_else(|| self.expected(j, "{"))?;
        self.blank(start, self.end(close));
        Ok(close + 1)
    }

    /// `declare ...`: the whole statement goes.
    fn ambient(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let start = self.declaration_start(i);
        let mut j = i + 1;
        if matches!(
            self.text(j),
            "module" | "namespace" | "global" | "class" | "enum" | "interface" | "abstract"
        ) {
            while j < to && !self.punct(j, "{") {
                j += 1;
            }
            let close = self
                .punct(j, "{")
                .then(|| self.matching(j, to))
                .flatten()
                .ok_or_else(|| self.expected(j, "{"))?;
            j = close + 1;
        } else {
            let mut depth = 0usize;
            j += 1;
            while j < to {
                if depth == 0 && (self.punct(j, ";") || self.newline_before(j)) {
                    break;
                }
                if matches!(self.sig[j].kind, TokenKind::Punct) {
                    match self.text(j) {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                }
                j += 1;
            }
        }
        if self.punct(j, ";") {
            j += 1;
        }
        self.blank(start, self.end(j - 1));
        Ok(j)
    }

    fn import(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let mut j = i + 1;
        if self.is_str(j) {
            return Ok(j + 1);
        }
        let type_only = self.ident(j, "type") && !self.punct(j + 1, ",") && !self.ident(j + 1, "from");
        if type_only {
            j += 1;
        }

        let mut import = ImportStatement {
            start: self.start(i),
            end: self.end(i),
            bindings: Vec::new(),
            had_specifiers: false,
        };

        if self.is_any_ident(j) && (self.punct(j + 1, ",") || self.ident(j + 1, "from")) {
            let comma = self.punct(j + 1, ",");
            import.bindings.push(ImportBinding {
                local: self.text(j).to_string(),
                start: self.start(j),
                end: if comma { self.end(j + 1) } else { self.end(j) },
                named: false,
            });
            j += if comma { 2 } else { 1 };
        }
        if self.punct(j, "*") && self.ident(j + 1, "as") && self.is_any_ident(j + 2) {
            import.bindings.push(ImportBinding {
                local: self.text(j + 2).to_string(),
                start: self.start(j),
                end: self.end(j + 2),
                named: false,
            });
            j += 3;
        }
        if self.punct(j, "{") {
            let close = self.matching(j, to).ok_or_else(|| self.expected(j, "}"))?;
            let mut k = j + 1;
            while k < close {
                let first = k;
                let type_specifier = self.ident(k, "type")
                    && ((self.is_any_ident(k + 1) && !self.ident(k + 1, "as")) || self.is_str(k + 1));
                if type_specifier {
                    k += 1;
                }
                let mut local = self.text(k).to_string();
                k += 1;
                if self.ident(k, "as") {
                    local = self.text(k + 1).to_string();
                    k += 2;
                }
                let mut end = self.end(k - 1);
                if self.punct(k, ",") {
                    end = self.end(k);
                    k += 1;
                }
                if type_only || type_specifier {
                    self.blank(self.start(first), end);
                } else {
                    import.bindings.push(ImportBinding {
                        local,
                        start: self.start(first),
                        end,
                        named: true,
                    });
                }
                import.had_specifiers = true;
            }
            j = close + 1;
        }

        // `import x = require(...)` and friends are left for later passes
        if !self.ident(j, "from") || !self.is_str(j + 1) {
            return Ok(j);
        }
        let mut end = self.end(j + 1);
        j += 2;
        if (self.ident(j, "with") || self.ident(j, "assert"))
            && self.punct(j + 1, "{")
            && !self.newline_before(j)
        {
            if let Some(close) = self.matching(j + 1, to) {
                end = self.end(close);
                j = close + 1;
            }
        }
        if self.punct(j, ";") {
            end = self.end(j);
            j += 1;
        }
        import.end = end;

        if type_only {
            self.blank(import.start, end);
        } else {
            self.out.imports.push(import);
        }
        Ok(j)
    }

    fn export(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let j = i + 1;
        if self.ident(j, "type") && (self.punct(j + 1, "{") || self.punct(j + 1, "*")) {
            let last = self.export_clause_end(j + 1, to)?;
            self.blank_tokens(i, last);
            return Ok(last + 1);
        }
        if self.punct(j, "{") {
            let close = self.matching(j, to).ok_or_else(|| self.expected(j, "}"))?;
            let reexport = self.ident(close + 1, "from");
            let mut k = j + 1;
            while k < close {
                let first = k;
                let type_specifier =
                    self.ident(k, "type") && self.is_any_ident(k + 1) && !self.ident(k + 1, "as");
                if type_specifier {
                    k += 1;
                }
                let local = self.text(k).to_string();
                k += 1;
                if self.ident(k, "as") {
                    k += 2;
                }
                let mut end = self.end(k - 1);
                if self.punct(k, ",") {
                    end = self.end(k);
                    k += 1;
                }
                if type_specifier {
                    self.blank(self.start(first), end);
                } else if !reexport {
                    self.out.exported.push(ExportSpecifier {
                        local,
                        start: self.start(first),
                        end,
                    });
                }
            }
            return Ok(self.export_clause_end(j, to)? + 1);
        }
        if self.punct(j, "*") {
            return Ok(self.export_clause_end(j, to)? + 1);
        }
        if self.punct(j, "=") {
            return Err(self.error(j, "TypeScript export assignments are not supported"));
        }
        Ok(i + 1)
    }

    /// Last token of `{ ... } [from "x"] [;]` or `* [as ns] from "x" [;]`.
    fn export_clause_end(&self, j: usize, to: usize) -> Result<usize, SyntaxError> {
        let mut k = if self.punct(j, "{") {
            self.matching(j, to).ok_or_else(|| self.expected(j, "}"))?
        } else if self.ident(j + 1, "as") {
            j + 2
        } else {
            j
        };
        if self.ident(k + 1, "from") && self.is_str(k + 2) {
            k += 2;
        }
        if self.punct(k + 1, ";") {
            k += 1;
        }
        Ok(k)
    }

    fn type_parameters(&mut self, open: usize, to: usize) -> Result<usize, SyntaxError> {
        let (close, at) = self
            .angle_close(open, to)
            .ok_or_else(|| self.expected(open, ">"))?;
        self.blank(self.start(open), at);
        Ok(close + 1)
    }

    fn function(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let mut j = i + 1;
        if self.punct(j, "*") {
            j += 1;
        }
        if self.is_any_ident(j) {
            j += 1;
        }
        if self.punct(j, "<") {
            j = self.type_parameters(j, to)?;
        }
        if !self.punct(j, "(") {
            return Ok(j);
        }
        let close = self.params(j, to)?;
        let mut k = close + 1;
        if self.punct(k, ":") {
            let (next, end) = self.skip_type(k + 1, to, false);
            self.blank(self.start(k), end);
            k = next;
        }
        if self.punct(k, "{") {
            return Ok(k);
        }

        // an overload signature has no body
        let start = self.declaration_start(i);
        if self.punct(k, ";") {
            k += 1;
        }
        self.blank(start, self.end(k - 1));
        Ok(k)
    }

    /// Strip the parameter list opening at `open`; returns the index of its `)`.
    fn params(&mut self, open: usize, to: usize) -> Result<usize, SyntaxError> {
        let close = self.matching(open, to).ok_or_else(|| self.expected(open, ")"))?;
        let mut j = open + 1;
        let mut first = true;

        while j < close {
            if first && self.ident(j, "this") && self.punct(j + 1, ":") {
                let (mut next, mut end) = self.skip_type(j + 2, close, false);
                if next < close && self.punct(next, ",") {
                    end = self.end(next);
                    next += 1;
                }
                self.blank(self.start(j), end);
                j = next;
                first = false;
                continue;
            }
            first = false;

            if PARAMETER_MODIFIERS.contains(&self.text(j))
                && self.is_any_ident(j)
                && (self.is_any_ident(j + 1) || self.punct(j + 1, "{") || self.punct(j + 1, "["))
            {
                return Err(self.error(j, "TypeScript parameter properties are not supported"));
            }

            if self.punct(j, "...") {
                j += 1;
            }
            if self.is_any_ident(j) {
                j += 1;
            } else if self.punct(j, "{") || self.punct(j, "[") {
                let Some(pattern_end) = self.matching(j, close) else {
                    break;
                };
                self.scan(j + 1, pattern_end)?;
                j = pattern_end + 1;
            }
            if self.punct(j, "?")
                && (j + 1 == close || self.punct(j + 1, ":") || self.punct(j + 1, ",") || self.punct(j + 1, "="))
            {
                self.blank_tokens(j, j);
                j += 1;
            }
            if self.punct(j, ":") {
                let (next, end) = self.skip_type(j + 1, close, false);
                self.blank(self.start(j), end);
                j = next;
            }

            // default value
            let comma = self.next_comma(j, close);
            if comma > j {
                self.scan(j, comma)?;
            }
            j = comma + 1;
        }
        Ok(close)
    }

    /// A `(` that may open an arrow function, method, or catch clause.
    fn paren(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let Some(close) = self.matching(i, to) else {
            return Ok(i + 1);
        };
        let after = close + 1;

        if self.punct(after, "=>") && !self.newline_before(after) {
            self.params(i, to)?;
            return Ok(after);
        }

        let return_type = self
            .punct(after, ":")
            .then(|| self.skip_type(after + 1, to, true))
            .filter(|&(next, _)| next > after + 1);
        if let Some((next, end)) = return_type {
            if self.punct(next, "=>") {
                self.params(i, to)?;
                self.blank(self.start(after), end);
                return Ok(next);
            }
        }

        let prev = self.prev(i);
        if prev.map_or(false, |p| self.ident(p, "catch")) {
            self.params(i, to)?;
            return Ok(after);
        }

        if prev.map_or(false, |p| self.is_name(p)) {
            if self.punct(after, "{") {
                self.params(i, to)?;
                return Ok(after);
            }
            if self.punct(after, ":") {
                let (next, end) = self.skip_type(after + 1, to, false);
                if self.punct(next, "{") {
                    self.params(i, to)?;
                    self.blank(self.start(after), end);
                    return Ok(next);
                }
            }
        }
        Ok(i + 1)
    }

    /// `f<T>(...)`, `new Map<K, V>()`, or the type parameters of a generic
    /// arrow function.
    fn type_arguments(&mut self, i: usize, to: usize) -> usize {
        let Some((close, at)) = self.angle_close(i, to) else {
            return i + 1;
        };
        if at != self.end(close) || !self.punct(close + 1, "(") {
            return i + 1;
        }
        let after_operand = self.prev(i).map_or(false, |p| self.operand_end(p));
        let call = after_operand && !self.newline_before(i);
        let arrow = !after_operand
            && self.matching(close + 1, to).map_or(false, |paren| {
                self.punct(paren + 1, "=>")
                    || (self.punct(paren + 1, ":")
                        && self.punct(self.skip_type(paren + 2, to, true).0, "=>"))
            });
        if call || arrow {
            self.blank(self.start(i), at);
            return close + 1;
        }
        i + 1
    }

    fn class(&mut self, i: usize, to: usize) -> Result<usize, SyntaxError> {
        let mut j = i + 1;
        if self.is_any_ident(j) && !self.ident(j, "extends") && !self.ident(j, "implements") {
            j += 1;
        }
        if self.punct(j, "<") {
            j = self.type_parameters(j, to)?;
        }
        if self.ident(j, "extends") {
            j += 1;
            while j < to && !self.punct(j, "{") && !self.ident(j, "implements") {
                if self.punct(j, "<") && self.is_name(j - 1) {
                    j = self.type_parameters(j, to)?;
                } else if self.punct(j, "(") || self.punct(j, "[") {
                    j = self.matching(j, to).ok_or_else(|| self.expected(j, ")"))? + 1;
                } else {
                    j += 1;
                }
            }
        }
        if self.ident(j, "implements") {
            let start = self.start(j);
            while j < to && !self.punct(j, "{") {
                j = match self.punct(j, "<").then(|| self.angle_close(j, to)).flatten() {
                    Some((close, _)) => close + 1,
                    None => j + 1,
                };
            }
            self.blank(start, self.end(j - 1));
        }
        if !self.punct(j, "{") {
            return Ok(j);
        }
        let close = self.matching(j, to).ok_or_else(|| self.expected(j, "}"))?;
        self.class_body(j, close)?;
        Ok(close + 1)
    }

    fn member_name_follows(&self, i: usize) -> bool {
        match self.kind(i) {
            Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number) => true,
            Some(TokenKind::Punct) => matches!(self.text(i), "[" | "#" | "*"),
            _ => false,
        }
    }

    /// End of a field initializer: a `;`, the end of the body, or a new
    /// member starting on the next line.
    fn initializer_end(&self, from: usize, close: usize) -> usize {
        let mut depth = 0usize;
        let mut j = from;
        while j < close {
            if depth == 0 && j > from {
                if self.punct(j, ";") {
                    return j;
                }
                let new_member = self.newline_before(j)
                    && self.operand_end(j - 1)
                    && (self.punct(j, "#")
                        || (self.is_any_ident(j)
                            && !matches!(self.text(j), "in" | "instanceof" | "as" | "satisfies")));
                if new_member {
                    return j;
                }
            }
            if matches!(self.sig[j].kind, TokenKind::Punct) {
                match self.text(j) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            j += 1;
        }
        close
    }

    fn class_body(&mut self, open: usize, close: usize) -> Result<(), SyntaxError> {
        let mut j = open + 1;
        while j < close {
            let member = j;
            if self.punct(j, ";") {
                j += 1;
                continue;
            }
            if self.ident(j, "static") && self.punct(j + 1, "{") {
                let block = self.matching(j + 1, close).ok_or_else(|| self.expected(j + 1, "}"))?;
                self.scan(j + 2, block)?;
                j = block + 1;
                continue;
            }

            let mut dropped = false;
            while self.is_any_ident(j)
                && CLASS_MODIFIERS.contains(&self.text(j))
                && self.member_name_follows(j + 1)
            {
                match self.text(j) {
                    "abstract" | "declare" => dropped = true,
                    "public" | "private" | "protected" | "readonly" | "override" => {
                        self.blank_tokens(j, j)
                    }
                    _ => {}
                }
                j += 1;
            }

            // index signature
            if self.punct(j, "[") && self.is_any_ident(j + 1) && self.punct(j + 2, ":") {
                let bracket = self.matching(j, close).ok_or_else(|| self.expected(j, "]"))?;
                let mut k = bracket + 1;
                let mut end = self.end(bracket);
                if self.punct(k, ":") {
                    (k, end) = self.skip_type(k + 1, close, false);
                }
                if self.punct(k, ";") {
                    end = self.end(k);
                    k += 1;
                }
                self.blank(self.start(member), end);
                j = k;
                continue;
            }

            if self.punct(j, "*") {
                j += 1;
            }
            if self.punct(j, "#") {
                j += 1;
            }
            if self.punct(j, "[") {
                let Some(computed) = self.matching(j, close) else {
                    break;
                };
                self.scan(j + 1, computed)?;
                j = computed + 1;
            } else if matches!(
                self.kind(j),
                Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number)
            ) {
                j += 1;
            }

            if (self.punct(j, "?") || self.punct(j, "!"))
                && (j + 1 == close
                    || self.newline_before(j + 1)
                    || [":", "(", ";", "=", "<"].iter().any(|p| self.punct(j + 1, p)))
            {
                self.blank_tokens(j, j);
                j += 1;
            }
            if self.punct(j, "<") {
                j = self.type_parameters(j, close)?;
            }

            if self.punct(j, "(") {
                let params = self.params(j, close)?;
                let mut k = params + 1;
                if self.punct(k, ":") {
                    let (next, end) = self.skip_type(k + 1, close, false);
                    self.blank(self.start(k), end);
                    k = next;
                }
                if self.punct(k, "{") {
                    let body = self.matching(k, close).ok_or_else(|| self.expected(k, "}"))?;
                    if dropped {
                        self.blank(self.start(member), self.end(body));
                    } else {
                        self.scan(k + 1, body)?;
                    }
                    j = body + 1;
                } else {
                    // overload or abstract signature
                    if self.punct(k, ";") {
                        k += 1;
                    }
                    self.blank(self.start(member), self.end(k - 1));
                    j = k;
                }
                continue;
            }

            if self.punct(j, ":") {
                let (next, end) = self.skip_type(j + 1, close, false);
                self.blank(self.start(j), end);
                j = next;
            }
            if self.punct(j, "=") {
                let end = self.initializer_end(j + 1, close);
                self.scan(j + 1, end)?;
                j = end;
            }
            if self.punct(j, ";") {
                j += 1;
            }
            if dropped && j > member {
                self.blank(self.start(member), self.end(j - 1));
            }
            if j == member {
                j += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::lexer::tokenize;

    fn strip(src: &str) -> String {
        let stripped = strip_types(src, true).unwrap();
        assert_eq!(stripped.len(), src.len());
        assert_eq!(
            stripped.match_indices('\n').map(|(i, _)| i).collect::<Vec<_>>(),
            src.match_indices('\n').map(|(i, _)| i).collect::<Vec<_>>()
        );
        stripped
    }

    /// Token texts, so tests do not depend on the exact blank runs.
    fn texts(src: &str) -> Vec<String> {
        tokenize(src, true)
            .unwrap()
            .iter()
            .filter(|t| !t.is_comment())
            .map(|t| t.text(src).split_whitespace().collect::<Vec<_>>().join(" "))
            .collect()
    }

    fn assert_strips_to(ts: &str, js: &str) {
        assert_eq!(texts(&strip(ts)), texts(js));
    }

    #[test]
    fn test_annotations_and_assertions() {
        assert_strips_to(
            "function greet(name: string, count?: number): string { return name; }\nconst total: number = a as number + b!;\nconst list = [1, 2] as const;\nlet pending!: Promise<void>, done = false;",
            "function greet(name, count) { return name; }\nconst total = a + b;\nconst list = [1, 2];\nlet pending, done = false;",
        );
    }

    #[test]
    fn test_type_declarations_disappear() {
        assert_strips_to(
            "export interface Props extends Base<string> { name: string; tags?: string[] }\ntype Id =\n  | string\n  | number;\ndeclare const VERSION: string;\nexport default function Card({ name }: Props) { return name; }",
            "export default function Card({ name }) { return name; }",
        );
    }

    #[test]
    fn test_generics() {
        assert_strips_to(
            "const id = <T,>(value: T): T => value;\nconst [items, setItems] = useState<Array<Item>>([]);\nconst cache = new Map<string, { hits: number }>();",
            "const id = (value) => value;\nconst [items, setItems] = useState([]);\nconst cache = new Map();",
        );
    }

    #[test]
    fn test_comparisons_are_not_generics() {
        assert_strips_to(
            "if (a < b && c > (d)) { run(); }\nconst f = (x) => x < limit ? x : limit;",
            "if (a < b && c > (d)) { run(); }\nconst f = (x) => x < limit ? x : limit;",
        );
    }

    #[test]
    fn test_classes() {
        assert_strips_to(
            "abstract class Box<T> extends Base<T> implements Shape, Sized {\n  private value?: T;\n  static count: number = 0;\n  declare label: string;\n  [key: string]: unknown;\n  constructor(v: T) { super(); }\n  get(): T { return this.value!; }\n  abstract area(): number;\n  handle = (event: Event): void => { this.value = undefined; }\n}",
            "class Box extends Base {\n  value;\n  static count = 0;\n  constructor(v) { super(); }\n  get() { return this.value; }\n  handle = (event) => { this.value = undefined; }\n}",
        );
    }

    #[test]
    fn test_object_methods_and_satisfies() {
        assert_strips_to(
            "export const theme = {\n  color(name: string): string { return name; },\n  size: 2,\n} satisfies Theme;\ntry { run(); } catch (error: unknown) { log(error as Error); }",
            "export const theme = {\n  color(name) { return name; },\n  size: 2,\n};\ntry { run(); } catch (error) { log(error); }",
        );
    }

    #[test]
    fn test_type_only_imports_are_elided() {
        assert_strips_to(
            "import type { Theme } from './theme';\nimport { format, type Locale, Unused } from './format';\nimport Default from './default';\nimport * as React from 'react';\nimport './styles';\nexport type { Locale };\nexport default function Price(p: { value: number; locale: Locale }) { return <b>{format(p.value)}</b>; }",
            "import { format, } from './format';\nimport './styles';\nexport default function Price(p) { return <b>{format(p.value)}</b>; }",
        );
    }

    #[test]
    fn test_imports_used_in_jsx_are_kept() {
        assert_strips_to(
            "import Button from './button';\nimport { Layout } from './layout';\nexport default () => <Layout.Main><Button /></Layout.Main>;",
            "import Button from './button';\nimport { Layout } from './layout';\nexport default () => <Layout.Main><Button /></Layout.Main>;",
        );
    }

    #[test]
    fn test_exported_local_types_are_dropped() {
        assert_strips_to(
            "interface Props { a: string }\nconst render = (p: Props) => p.a;\nexport { Props, render };",
            "const render = (p) => p.a;\nexport { render };",
        );
    }

    #[test]
    fn test_overloads_are_removed() {
        assert_strips_to(
            "export function pick(a: string): string;\nexport function pick(a: number): number;\nexport function pick(a: any) { return a; }",
            "export function pick(a) { return a; }",
        );
    }

    #[test]
    fn test_multibyte_types_keep_offsets() {
        let src = "type Label = \"caf\u{e9} \u{1F600}\";\nexport default 1;";
        let stripped = strip(src);
        assert!(stripped.ends_with("\nexport default 1;"));
        assert!(stripped.lines().next().unwrap().trim().is_empty());
    }

    #[test]
    fn test_unsupported_constructs() {
        let error = strip_types("enum Color { Red }", false).unwrap_err();
        assert_eq!(error.message, "TypeScript enums are not supported");
        assert_eq!(error.offset, 0);

        let error = strip_types("class A {\n  constructor(private a: string) {}\n}", false)
            .unwrap_err();
        assert_eq!(error.message, "TypeScript parameter properties are not supported");
    }
}
