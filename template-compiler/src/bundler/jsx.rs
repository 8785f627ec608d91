//! JSX syntax tree and the text rules of the automatic runtime transform.

use super::lexer::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct JsxElement {
    pub start: usize,
    pub end: usize,
    /// `None` for fragments (`<>...</>`).
    pub name: Option<JsxName>,
    pub attributes: Vec<JsxAttribute>,
    pub children: Vec<JsxChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsxName {
    pub text: String,
    pub start: usize,
}

impl JsxName {
    /// Lowercase, dashed, and namespaced names are host elements and compile
    /// to string literals; everything else is a component reference.
    pub fn is_intrinsic(&self) -> bool {
        if self.text.contains('.') {
            return false;
        }
        self.text.contains('-')
            || self.text.contains(':')
            || self
                .text
                .chars()
                .next()
                .map(|c| c.is_ascii_lowercase())
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxAttribute {
    Named {
        name: String,
        start: usize,
        value: Option<JsxAttrValue>,
    },
    Spread(JsxExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxAttrValue {
    Str { value: String, start: usize },
    Expr(JsxExpr),
    Element(Box<JsxElement>),
}

/// The body of a `{...}` container; `start..end` excludes the braces.
#[derive(Debug, Clone, PartialEq)]
pub struct JsxExpr {
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxChild {
    Text { value: String, start: usize },
    Expr(JsxExpr),
    Element(Box<JsxElement>),
}

impl JsxElement {
    /// Visit every expression container nested in this element.
    pub fn for_each_expr<'a>(&'a self, visit: &mut dyn FnMut(&'a JsxExpr)) {
        for attribute in &self.attributes {
            match attribute {
                JsxAttribute::Spread(expr) => visit(expr),
                JsxAttribute::Named {
                    value: Some(JsxAttrValue::Expr(expr)),
                    ..
                } => visit(expr),
                JsxAttribute::Named {
                    value: Some(JsxAttrValue::Element(element)),
                    ..
                } => element.for_each_expr(visit),
                JsxAttribute::Named { .. } => {}
            }
        }
        for child in &self.children {
            match child {
                JsxChild::Expr(expr) => visit(expr),
                JsxChild::Element(element) => element.for_each_expr(visit),
                JsxChild::Text { .. } => {}
            }
        }
    }
}

impl JsxElement {
    /// Visit the tag name of this element and of every element nested in it.
    pub fn for_each_name<'a>(&'a self, visit: &mut dyn FnMut(&'a JsxName)) {
        if let Some(name) = &self.name {
            visit(name);
        }
        for attribute in &self.attributes {
            if let JsxAttribute::Named {
                value: Some(JsxAttrValue::Element(element)),
                ..
            } = attribute
            {
                element.for_each_name(visit);
            }
        }
        for child in &self.children {
            if let JsxChild::Element(element) = child {
                element.for_each_name(visit);
            }
        }
    }
}

/// Collapse JSX text the way the automatic runtime does: lines are trimmed,
/// lines holding only whitespace disappear, and the remaining lines are
/// joined by single spaces. Returns `None` when nothing is left.
pub fn clean_text(raw: &str) -> Option<String> {
    let lines: Vec<String> = raw
        .split('\n')
        .map(|line| line.trim_end_matches('\r').replace('\t', " "))
        .collect();

    let last_non_empty = lines.iter().rposition(|line| !line.trim_matches(' ').is_empty());

    let mut result = String::new();
    for (index, line) in lines.iter().enumerate() {
        let is_first = index == 0;
        let is_last = index == lines.len() - 1;

        let mut trimmed: &str = line;
        if !is_first {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if !is_last {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if trimmed.is_empty() {
            continue;
        }
        result.push_str(trimmed);
        if Some(index) != last_non_empty {
            result.push(' ');
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(decode_entities(&result))
    }
}

/// Decode the HTML character references allowed in JSX text and attribute strings.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&candidate[..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        "times" => '\u{d7}',
        "zwnj" => '\u{200c}',
        _ => return None,
    };
    Some(c)
}

/// Render a property name as an object-literal key.
pub fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        json_string(name)
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

pub fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_lines() {
        assert_eq!(clean_text("\n    Hello\n    world  \n  ").as_deref(), Some("Hello world"));
        assert_eq!(clean_text("  inline  ").as_deref(), Some("  inline  "));
        assert_eq!(clean_text("\n   \n  "), None);
        assert_eq!(clean_text("a\n\n   b").as_deref(), Some("a b"));
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#169; &#xA9;"), "\u{a9} \u{a9}");
        assert_eq!(decode_entities("AT&T & co"), "AT&T & co");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_intrinsic_names() {
        let name = |text: &str| JsxName {
            text: text.to_string(),
            start: 0,
        };
        assert!(name("div").is_intrinsic());
        assert!(name("my-element").is_intrinsic());
        assert!(name("svg:rect").is_intrinsic());
        assert!(!name("Button").is_intrinsic());
        assert!(!name("ui.button").is_intrinsic());
    }

    #[test]
    fn test_property_keys() {
        assert_eq!(property_key("className"), "className");
        assert_eq!(property_key("data-id"), "\"data-id\"");
    }
}
