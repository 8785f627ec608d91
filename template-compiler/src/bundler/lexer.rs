//! Token-level scanner for JavaScript and JSX sources.
//!
//! The bundler never builds a full AST. It works on a flat token stream in
//! which the nested constructs that matter for rewriting (template literal
//! substitutions and JSX elements) carry their own token lists. Whitespace is
//! not tokenized; emitters copy the gaps between tokens verbatim.

use super::jsx::{self, JsxAttribute, JsxAttrValue, JsxChild, JsxElement, JsxExpr, JsxName};

/// Keywords after which an expression (and therefore a regex or JSX) may start.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "extends",
];

/// Punctuators, longest first so the scanner always takes the longest match.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/",
    "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    Punct,
    Str,
    Number,
    Regex,
    Comment,
    Template(Vec<TemplatePart>),
    Jsx(Box<JsxElement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::Comment)
    }

    pub fn is_punct(&self, src: &str, value: &str) -> bool {
        matches!(self.kind, TokenKind::Punct) && self.text(src) == value
    }

    pub fn is_ident(&self, src: &str, value: &str) -> bool {
        matches!(self.kind, TokenKind::Ident) && self.text(src) == value
    }
}

/// A piece of a template literal: raw text including its delimiters, or a
/// `${...}` substitution body spanning `start..end`.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Raw { start: usize, end: usize },
    Expr { start: usize, end: usize, tokens: Vec<Token> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

pub type LexResult<T> = Result<T, SyntaxError>;

/// Tokenize a whole source file.
pub fn tokenize(src: &str, jsx: bool) -> LexResult<Vec<Token>> {
    Lexer::new(src, jsx, false).run()
}

/// Tokenize a TypeScript file. With `jsx` set, `<T,>` and `<T extends U>`
/// open type parameter lists instead of elements.
pub fn tokenize_typescript(src: &str, jsx: bool) -> LexResult<Vec<Token>> {
    Lexer::new(src, jsx, true).run()
}

/// `T,` or `T extends` right after a `<`.
fn type_parameters_follow(rest: &str) -> bool {
    let name_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(rest.len());
    if name_end == 0 {
        return false;
    }
    let after = rest[name_end..].trim_start();
    after.starts_with(',')
        || (after.starts_with("extends")
            && after["extends".len()..].starts_with(|c: char| c.is_whitespace()))
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    jsx: bool,
    typescript: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, jsx: bool, typescript: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            jsx,
            typescript,
        }
    }

    fn run(mut self) -> LexResult<Vec<Token>> {
        if self.src.starts_with("#!") {
            let end = self.src.find('\n').unwrap_or(self.src.len());
            self.pos = end;
            let mut tokens = vec![Token {
                kind: TokenKind::Comment,
                start: 0,
                end,
            }];
            tokens.extend(self.lex_until(false)?);
            return Ok(tokens);
        }
        self.lex_until(false)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn current_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '\u{feff}' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    /// Lex tokens until end of input, or until the `}` that closes the
    /// enclosing substitution when `in_braces` is set (left unconsumed).
    fn lex_until(&mut self, in_braces: bool) -> LexResult<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut depth = 0usize;

        loop {
            self.skip_whitespace();
            let Some(byte) = self.peek() else {
                if in_braces {
                    return Err(SyntaxError::new("Unexpected end of file", self.pos));
                }
                return Ok(tokens);
            };

            let start = self.pos;
            let expression_expected = self.expression_expected(&tokens);

            let kind = match byte {
                b'/' if self.peek_at(1) == Some(b'/') => {
                    self.line_comment();
                    TokenKind::Comment
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.block_comment()?;
                    TokenKind::Comment
                }
                b'/' if expression_expected => {
                    self.regex()?;
                    TokenKind::Regex
                }
                b'\'' | b'"' => {
                    self.string(byte)?;
                    TokenKind::Str
                }
                b'`' => TokenKind::Template(self.template()?),
                b'0'..=b'9' => {
                    self.number();
                    TokenKind::Number
                }
                b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                    self.number();
                    TokenKind::Number
                }
                b'<' if self.jsx && expression_expected && self.jsx_can_start() => {
                    TokenKind::Jsx(Box::new(self.jsx_element()?))
                }
                b'}' if in_braces && depth == 0 => return Ok(tokens),
                _ if self.ident_start() => {
                    self.ident();
                    TokenKind::Ident
                }
                _ => {
                    let punct = self.punct()?;
                    match punct {
                        "{" => depth += 1,
                        "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    TokenKind::Punct
                }
            };

            tokens.push(Token {
                kind,
                start,
                end: self.pos,
            });
        }
    }

    /// Whether the previous significant token leaves the parser expecting an
    /// operand, which decides between division and regex, and between
    /// less-than and JSX.
    fn expression_expected(&self, tokens: &[Token]) -> bool {
        let Some(prev) = tokens.iter().rev().find(|t| !t.is_comment()) else {
            return true;
        };
        match &prev.kind {
            TokenKind::Punct => !matches!(prev.text(self.src), ")" | "]"),
            TokenKind::Ident => EXPRESSION_KEYWORDS.contains(&prev.text(self.src)),
            _ => false,
        }
    }

    fn ident_start(&self) -> bool {
        match self.current_char() {
            Some(c) => c.is_alphabetic() || c == '_' || c == '$' || c == '\\',
            None => false,
        }
    }

    fn ident(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || c == '\u{200c}' || c == '\u{200d}' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn number(&mut self) {
        let hex = self.src[self.pos..].starts_with("0x") || self.src[self.pos..].starts_with("0X");
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
                if !hex && (b == b'e' || b == b'E') && matches!(self.peek(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn punct(&mut self) -> LexResult<&'static str> {
        let rest = &self.src[self.pos..];
        for &punct in PUNCTUATORS {
            if rest.starts_with(punct) {
                self.pos += punct.len();
                return Ok(punct);
            }
        }
        let c = self.current_char().unwrap_or('\0');
        Err(SyntaxError::new(format!("Unexpected {:?}", c.to_string()), self.pos))
    }

    fn line_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn block_comment(&mut self) -> LexResult<()> {
        let start = self.pos;
        match self.src[self.pos + 2..].find("*/") {
            Some(offset) => {
                self.pos += 2 + offset + 2;
                Ok(())
            }
            None => Err(SyntaxError::new("Expected \"*/\" to terminate multi-line comment", start)),
        }
    }

    fn string(&mut self, quote: u8) -> LexResult<()> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => {
                    self.pos += 1;
                    self.skip_escaped_char();
                }
                b'\n' | b'\r' => break,
                _ if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(SyntaxError::new("Unterminated string literal", start))
    }

    fn skip_escaped_char(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
            if c == '\r' && self.peek() == Some(b'\n') {
                self.pos += 1;
            }
        }
    }

    fn regex(&mut self) -> LexResult<()> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(SyntaxError::new("Unterminated regular expression", start))
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.skip_escaped_char();
                }
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let c = self.current_char().unwrap_or('\0');
                    self.pos += c.len_utf8().max(1);
                }
            }
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        Ok(())
    }

    fn template(&mut self) -> LexResult<Vec<TemplatePart>> {
        let start = self.pos;
        let mut parts = Vec::new();
        let mut part_start = self.pos;
        self.pos += 1;

        loop {
            match self.peek() {
                None => return Err(SyntaxError::new("Unterminated template literal", start)),
                Some(b'\\') => {
                    self.pos += 1;
                    self.skip_escaped_char();
                }
                Some(b'`') => {
                    self.pos += 1;
                    parts.push(TemplatePart::Raw {
                        start: part_start,
                        end: self.pos,
                    });
                    return Ok(parts);
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    parts.push(TemplatePart::Raw {
                        start: part_start,
                        end: self.pos,
                    });
                    let expr_start = self.pos;
                    let tokens = self.lex_until(true)?;
                    parts.push(TemplatePart::Expr {
                        start: expr_start,
                        end: self.pos,
                        tokens,
                    });
                    // the closing brace opens the next raw part
                    part_start = self.pos;
                    self.pos += 1;
                }
                Some(_) => {
                    let c = self.current_char().unwrap_or('\0');
                    self.pos += c.len_utf8().max(1);
                }
            }
        }
    }

    fn jsx_can_start(&self) -> bool {
        let rest = &self.src[self.pos + 1..];
        let starts = match rest.chars().next() {
            Some(c) => c.is_alphabetic() || c == '_' || c == '$' || c == '>',
            None => false,
        };
        starts && !(self.typescript && type_parameters_follow(rest))
    }

    // JSX

    fn jsx_element(&mut self) -> LexResult<JsxElement> {
        let start = self.pos;
        self.pos += 1;
        self.skip_whitespace();

        if self.peek() == Some(b'>') {
            self.pos += 1;
            let children = self.jsx_children(None)?;
            return Ok(JsxElement {
                start,
                end: self.pos,
                name: None,
                attributes: Vec::new(),
                children,
            });
        }

        let name = self.jsx_name()?;
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    if self.peek_at(1) != Some(b'>') {
                        return Err(SyntaxError::new("Expected \">\" but found \"/\"", self.pos));
                    }
                    self.pos += 2;
                    return Ok(JsxElement {
                        start,
                        end: self.pos,
                        name: Some(name),
                        attributes,
                        children: Vec::new(),
                    });
                }
                Some(b'>') => {
                    self.pos += 1;
                    let children = self.jsx_children(Some(&name.text))?;
                    return Ok(JsxElement {
                        start,
                        end: self.pos,
                        name: Some(name),
                        attributes,
                        children,
                    });
                }
                Some(b'{') => {
                    let brace = self.pos;
                    self.pos += 1;
                    self.skip_whitespace();
                    if !self.src[self.pos..].starts_with("...") {
                        return Err(SyntaxError::new("Expected \"...\" but found \"{\"", brace));
                    }
                    self.pos += 3;
                    let expr = self.jsx_expression_body()?;
                    attributes.push(JsxAttribute::Spread(expr));
                }
                Some(_) if self.ident_start() => {
                    let attr_start = self.pos;
                    while let Some(c) = self.current_char() {
                        if c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | ':') {
                            self.pos += c.len_utf8();
                        } else {
                            break;
                        }
                    }
                    let attr_name = self.src[attr_start..self.pos].to_string();
                    self.skip_whitespace();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        Some(self.jsx_attribute_value()?)
                    } else {
                        None
                    };
                    attributes.push(JsxAttribute::Named {
                        name: attr_name,
                        start: attr_start,
                        value,
                    });
                }
                Some(_) => {
                    let c = self.current_char().unwrap_or('\0');
                    return Err(SyntaxError::new(
                        format!("Expected \">\" but found {:?}", c.to_string()),
                        self.pos,
                    ));
                }
                None => {
                    return Err(SyntaxError::new(
                        "Unexpected end of file before a closing \">\"",
                        self.pos,
                    ))
                }
            }
        }
    }

    fn jsx_name(&mut self) -> LexResult<JsxName> {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '.' | ':') {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(SyntaxError::new("Expected identifier after \"<\"", start));
        }
        Ok(JsxName {
            text: self.src[start..self.pos].to_string(),
            start,
        })
    }

    fn jsx_attribute_value(&mut self) -> LexResult<JsxAttrValue> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let start = self.pos;
                self.pos += 1;
                match self.src[self.pos..].find(quote as char) {
                    Some(offset) => {
                        let raw = &self.src[self.pos..self.pos + offset];
                        self.pos += offset + 1;
                        Ok(JsxAttrValue::Str {
                            value: jsx::decode_entities(raw),
                            start,
                        })
                    }
                    None => Err(SyntaxError::new("Unterminated string literal", start)),
                }
            }
            Some(b'{') => {
                self.pos += 1;
                Ok(JsxAttrValue::Expr(self.jsx_expression_body()?))
            }
            Some(b'<') => Ok(JsxAttrValue::Element(Box::new(self.jsx_element()?))),
            _ => Err(SyntaxError::new(
                "Expected attribute value after \"=\"",
                self.pos,
            )),
        }
    }

    /// Lex the body of a `{...}` container whose opening brace was consumed,
    /// then consume the closing brace.
    fn jsx_expression_body(&mut self) -> LexResult<JsxExpr> {
        let start = self.pos;
        let tokens = self.lex_until(true)?;
        let end = self.pos;
        self.pos += 1;
        Ok(JsxExpr { start, end, tokens })
    }

    fn jsx_children(&mut self, parent: Option<&str>) -> LexResult<Vec<JsxChild>> {
        let mut children = Vec::new();

        loop {
            let text_start = self.pos;
            while let Some(b) = self.peek() {
                match b {
                    b'<' | b'{' => break,
                    b'}' | b'>' => {
                        return Err(SyntaxError::new(
                            format!(
                                "The character \"{}\" is not valid inside a JSX element",
                                b as char
                            ),
                            self.pos,
                        ))
                    }
                    _ => self.pos += 1,
                }
            }
            if self.pos > text_start {
                let raw = &self.src[text_start..self.pos];
                if let Some(value) = jsx::clean_text(raw) {
                    children.push(JsxChild::Text {
                        value,
                        start: text_start,
                    });
                }
            }

            match self.peek() {
                Some(b'{') => {
                    self.pos += 1;
                    let expr = self.jsx_expression_body()?;
                    if expr.tokens.iter().any(|t| !t.is_comment()) {
                        children.push(JsxChild::Expr(expr));
                    }
                }
                Some(b'<') => {
                    let tag_start = self.pos;
                    let mut ahead = self.pos + 1;
                    while matches!(self.bytes.get(ahead), Some(b) if b.is_ascii_whitespace()) {
                        ahead += 1;
                    }
                    if self.bytes.get(ahead) == Some(&b'/') {
                        self.pos = ahead + 1;
                        self.skip_whitespace();
                        let closing = if self.peek() == Some(b'>') {
                            None
                        } else {
                            Some(self.jsx_name()?.text)
                        };
                        self.skip_whitespace();
                        if self.peek() != Some(b'>') {
                            return Err(SyntaxError::new("Expected \">\"", self.pos));
                        }
                        self.pos += 1;
                        if closing.as_deref() != parent {
                            let expected = parent.unwrap_or("");
                            return Err(SyntaxError::new(
                                format!(
                                    "Expected closing \"{}\" tag to match opening \"{}\" tag",
                                    expected, expected
                                ),
                                tag_start,
                            ));
                        }
                        return Ok(children);
                    }
                    children.push(JsxChild::Element(Box::new(self.jsx_element()?)));
                }
                _ => {
                    return Err(SyntaxError::new(
                        format!(
                            "Unexpected end of file before a closing \"{}\" tag",
                            parent.unwrap_or("")
                        ),
                        self.pos,
                    ))
                }
            }
        }
    }
}
