//! Code generation with position tracking. Every original token copied into
//! the bundle records a mapping back to its source position.

use std::collections::{BTreeMap, HashMap};

use super::jsx::{json_string, property_key, JsxAttrValue, JsxAttribute, JsxChild, JsxElement, JsxExpr};
use super::lexer::{TemplatePart, Token, TokenKind};
use super::transform::{Piece, Rewrite};
use crate::sourcemap::{Mapping, RawSourceMap, SourceMapBuilder};

/// Byte offset to line/column conversion for one source file. Columns are
/// counted in UTF-16 code units, as engines and source maps do.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    /// Zero-based line and column of `offset`.
    pub fn position(&self, src: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(src.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = src
            .get(line_start..offset)
            .map(|text| text.encode_utf16().count())
            .unwrap_or(0);
        (line as u32, column as u32)
    }

    /// Byte offset of a zero-based line/column, clamped to the source.
    pub fn offset(&self, src: &str, line: u32, column: u32) -> usize {
        let Some(&line_start) = self.line_starts.get(line as usize) else {
            return src.len();
        };
        let mut units = 0u32;
        for (i, c) in src[line_start..].char_indices() {
            if units >= column || c == '\n' {
                return line_start + i;
            }
            units += c.len_utf16() as u32;
        }
        src.len()
    }
}

/// Output buffer for the bundle.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    line: u32,
    column: u32,
    map: SourceMapBuilder,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, name: impl Into<String>, content: Option<String>) -> u32 {
        self.map.add_source(name, content)
    }

    pub fn write(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.out.push_str(text);
    }

    /// Record that the next generated byte corresponds to `line:column` of `source`.
    pub fn map_to(&mut self, source: u32, line: u32, column: u32) {
        self.map.add_mapping(Mapping {
            generated_line: self.line,
            generated_column: self.column,
            source,
            original_line: line,
            original_column: column,
            name: None,
        });
    }

    pub fn finish(self, file: Option<String>) -> (String, RawSourceMap) {
        (self.out, self.map.build(file))
    }
}

/// Emits one module's tokens into a shared [`CodeWriter`], applying the
/// rewrites planned by the transform.
pub struct ModuleEmitter<'a> {
    pub writer: &'a mut CodeWriter,
    pub src: &'a str,
    pub index: &'a LineIndex,
    pub source: u32,
    pub rewrites: &'a BTreeMap<usize, Rewrite>,
    pub resolved: &'a HashMap<String, String>,
}

impl<'a> ModuleEmitter<'a> {
    fn mark(&mut self, offset: usize) {
        let (line, column) = self.index.position(self.src, offset);
        self.writer.map_to(self.source, line, column);
    }

    /// Copy original text, mapping its start and the start of every line it spans.
    fn copy(&mut self, start: usize, end: usize) {
        let text = &self.src[start..end];
        self.mark(start);
        let mut line_start = 0;
        for (i, _) in text.match_indices('\n') {
            self.writer.write(&text[line_start..=i]);
            line_start = i + 1;
            if line_start < text.len() {
                self.mark(start + line_start);
            }
        }
        self.writer.write(&text[line_start..]);
    }

    fn gap(&mut self, start: usize, end: usize) {
        if end > start {
            self.writer.write(&self.src[start..end]);
        }
    }

    pub fn pieces(&mut self, pieces: &[Piece]) {
        for piece in pieces {
            match piece {
                Piece::Text(text) => self.writer.write(text),
                Piece::ModuleId(specifier) => {
                    let id = self
                        .resolved
                        .get(specifier)
                        .map(String::as_str)
                        .unwrap_or(specifier);
                    self.writer.write(&json_string(id));
                }
            }
        }
    }

    /// Emit `tokens`, which lie inside `start..end`, copying the whitespace
    /// between them.
    pub fn emit_tokens(&mut self, tokens: &[Token], start: usize, end: usize) {
        let mut cursor = start;
        let mut consumed_until = 0usize;

        for token in tokens {
            if token.start < consumed_until {
                continue;
            }
            if token.start > cursor {
                self.gap(cursor, token.start);
            }
            cursor = cursor.max(token.start);

            if let Some(rewrite) = self.rewrites.get(&token.start) {
                self.mark(token.start);
                self.pieces(&rewrite.pieces);
                if rewrite.end > token.start {
                    consumed_until = rewrite.end;
                    cursor = rewrite.end;
                    continue;
                }
            }

            self.emit_token(token);
            cursor = token.end;
        }

        if end > cursor {
            self.gap(cursor, end);
        }
    }

    fn emit_token(&mut self, token: &Token) {
        match &token.kind {
            TokenKind::Template(parts) => {
                for part in parts {
                    match part {
                        TemplatePart::Raw { start, end } => self.copy(*start, *end),
                        TemplatePart::Expr { start, end, tokens } => {
                            self.emit_tokens(tokens, *start, *end)
                        }
                    }
                }
            }
            TokenKind::Jsx(element) => self.emit_jsx(element),
            _ => self.copy(token.start, token.end),
        }
    }

    fn emit_expr(&mut self, expr: &JsxExpr) {
        self.emit_tokens(&expr.tokens, expr.start, expr.end);
    }

    /// Compile an element to an automatic-runtime call:
    /// `jsx(type, { ...props, children }, key)`, or `jsxs` for several children.
    fn emit_jsx(&mut self, element: &JsxElement) {
        self.mark(element.start);
        let factory = if element.children.len() > 1 {
            "__jsx_runtime.jsxs("
        } else {
            "__jsx_runtime.jsx("
        };
        self.writer.write(factory);

        match &element.name {
            None => self.writer.write("__jsx_runtime.Fragment"),
            Some(name) => {
                self.mark(name.start);
                if name.is_intrinsic() {
                    self.writer.write(&json_string(&name.text));
                } else {
                    self.writer.write(&name.text);
                }
            }
        }

        self.writer.write(", {");
        let mut first = true;
        let mut key: Option<&JsxAttribute> = None;

        for attribute in &element.attributes {
            if let JsxAttribute::Named { name, .. } = attribute {
                if name == "key" {
                    key = Some(attribute);
                    continue;
                }
            }
            if !first {
                self.writer.write(", ");
            }
            first = false;

            match attribute {
                JsxAttribute::Named { name, start, value } => {
                    self.mark(*start);
                    self.writer.write(&property_key(name));
                    self.writer.write(": ");
                    self.emit_attribute_value(value.as_ref());
                }
                JsxAttribute::Spread(expr) => {
                    self.writer.write("...");
                    self.emit_expr(expr);
                }
            }
        }

        if !element.children.is_empty() {
            if !first {
                self.writer.write(", ");
            }
            self.writer.write("children: ");
            let many = element.children.len() > 1;
            if many {
                self.writer.write("[");
            }
            for (i, child) in element.children.iter().enumerate() {
                if i > 0 {
                    self.writer.write(", ");
                }
                match child {
                    JsxChild::Text { value, start } => {
                        self.mark(*start);
                        self.writer.write(&json_string(value));
                    }
                    JsxChild::Expr(expr) => self.emit_expr(expr),
                    JsxChild::Element(child) => self.emit_jsx(child),
                }
            }
            if many {
                self.writer.write("]");
            }
        }
        self.writer.write("}");

        if let Some(JsxAttribute::Named { value, .. }) = key {
            self.writer.write(", ");
            self.emit_attribute_value(value.as_ref());
        }
        self.writer.write(")");
    }

    fn emit_attribute_value(&mut self, value: Option<&JsxAttrValue>) {
        match value {
            None => self.writer.write("true"),
            Some(JsxAttrValue::Str { value, start }) => {
                self.mark(*start);
                self.writer.write(&json_string(value));
            }
            Some(JsxAttrValue::Expr(expr)) => self.emit_expr(expr),
            Some(JsxAttrValue::Element(element)) => self.emit_jsx(element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::super::transform::{analyze, AnalyzeOptions};
    use super::*;

    fn compile(src: &str) -> String {
        let tokens = tokenize(src, true).unwrap();
        let analysis = analyze(
            &tokens,
            src,
            &AnalyzeOptions {
                jsx_runtime: "react/jsx-runtime".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let index = LineIndex::new(src);
        let resolved = HashMap::from([("./b".to_string(), "./emails/b.jsx".to_string())]);
        let mut writer = CodeWriter::new();
        let source = writer.add_source("a.jsx", None);
        let mut emitter = ModuleEmitter {
            writer: &mut writer,
            src,
            index: &index,
            source,
            rewrites: &analysis.rewrites,
            resolved: &resolved,
        };
        emitter.emit_tokens(&tokens, 0, src.len());
        writer.finish(None).0
    }

    #[test]
    fn test_line_index_positions() {
        let src = "ab\ncd\u{1F600}e\n";
        let index = LineIndex::new(src);
        assert_eq!(index.position(src, 0), (0, 0));
        assert_eq!(index.position(src, 4), (1, 1));
        // the emoji takes two UTF-16 units
        assert_eq!(index.position(src, 9), (1, 4));
        assert_eq!(index.offset(src, 1, 1), 4);
    }

    #[test]
    fn test_jsx_compiles_to_runtime_calls() {
        let out = compile(r#"const a = <div className="x" key={id}>Hi {name}</div>;"#);
        assert_eq!(
            out,
            r#"const a = __jsx_runtime.jsxs("div", {className: "x", children: ["Hi ", name]}, id);"#
        );
    }

    #[test]
    fn test_jsx_components_fragments_and_spreads() {
        let out = compile(r#"x = <><Card {...props} data-id="1" open /></>"#);
        assert_eq!(
            out,
            r#"x = __jsx_runtime.jsx(__jsx_runtime.Fragment, {children: __jsx_runtime.jsx(Card, {...props, "data-id": "1", open: true})})"#
        );
    }

    #[test]
    fn test_imports_are_rewritten_with_resolved_ids() {
        let out = compile("import B from './b';\nexport const c = B;\n");
        assert_eq!(
            out,
            "var __import_0 = __preview_interop(require(\"./emails/b.jsx\")); var B = __import_0.default;\n const c = B;\n"
        );
    }

    #[test]
    fn test_template_substitutions_are_transformed() {
        let out = compile("const s = `a ${require('./b')} c`;");
        assert_eq!(out, "const s = `a ${require(\"./emails/b.jsx\")} c`;");
    }
}
