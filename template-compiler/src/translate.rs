//! Bundle-space to source-space translation of stack traces.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::envelope::ErrorObject;
use crate::paths;
use crate::sandbox::RawError;
use crate::sourcemap::{ParsedSourceMap, RawSourceMap};

fn frame_pattern() -> &'static Regex {
    static FRAME: OnceLock<Regex> = OnceLock::new();
    FRAME.get_or_init(|| {
        Regex::new(r"^\s*at (?:(.+?) \()?(.+?):(\d+)(?::(\d+))?\)?$").expect("valid frame pattern")
    })
}

/// One parsed `at ...` line of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub method: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

impl StackFrame {
    pub fn parse(line: &str) -> Option<Self> {
        let captures = frame_pattern().captures(line)?;
        Some(Self {
            method: captures.get(1).map(|m| m.as_str().to_string()),
            file: captures.get(2)?.as_str().to_string(),
            line: captures.get(3)?.as_str().parse().ok()?,
            column: captures.get(4).and_then(|c| c.as_str().parse().ok()),
        })
    }

    fn render(&self) -> String {
        let position = match self.column {
            Some(column) => format!("{}:{}:{}", self.file, self.line, column),
            None => format!("{}:{}", self.file, self.line),
        };
        match self.method.as_deref() {
            Some(method) if method != "<anonymous>" => format!("    at {} ({})", method, position),
            _ => format!("    at {}", position),
        }
    }
}

/// A rebased source map for one bundle, plus the entry whose frames it maps.
#[derive(Debug, Clone)]
pub struct SourceMapTranslator {
    map: Option<ParsedSourceMap>,
    rebased: RawSourceMap,
    entry: PathBuf,
    root: PathBuf,
}

impl SourceMapTranslator {
    /// Rebase `raw` against its on-disk location `map_path`, then decode it.
    /// A map whose mappings cannot be decoded still rebases; its frames pass
    /// through unmapped.
    pub fn new(raw: &RawSourceMap, map_path: &Path, entry: &Path) -> Self {
        let mut rebased = raw.clone();
        rebased.rebase(map_path);
        let root = rebased
            .source_root_path()
            .unwrap_or_else(|| paths::parent_dir(map_path));

        let map = match ParsedSourceMap::new(rebased.clone()) {
            Ok(map) => Some(map),
            Err(e) => {
                debug!("Source map for {} is not decodable: {}", entry.display(), e);
                None
            }
        };

        Self {
            map,
            rebased,
            entry: entry.to_path_buf(),
            root,
        }
    }

    /// The map with absolute sources and its root set to the project root.
    pub fn source_map(&self) -> &RawSourceMap {
        &self.rebased
    }

    fn map_frame(&self, frame: &StackFrame) -> Option<StackFrame> {
        if Path::new(&frame.file) != self.entry {
            return None;
        }
        let map = self.map.as_ref()?;
        let column = frame.column.map_or(0, |c| c.saturating_sub(1));
        let position = map.original_position_for(frame.line, column)?;
        let file = paths::relative_to(&self.root, Path::new(&position.source))
            .unwrap_or(position.source);

        Some(StackFrame {
            method: position.name.or_else(|| frame.method.clone()),
            file,
            line: position.line,
            column: Some(position.column),
        })
    }

    /// Rewrite `stack` as `name: message` followed by its frames, with entry
    /// frames moved to original-source coordinates. Lines that are not
    /// frames are dropped.
    pub fn translate_stack(&self, name: &str, message: &str, stack: &str) -> String {
        let mut lines = vec![format!("{}: {}", name, message)];
        for line in stack.lines() {
            let Some(frame) = StackFrame::parse(line) else {
                continue;
            };
            match self.map_frame(&frame) {
                Some(mapped) => lines.push(mapped.render()),
                None => lines.push(format!("    {}", line.trim())),
            }
        }
        lines.join("\n")
    }

    pub fn translate(&self, raw: &RawError) -> ErrorObject {
        ErrorObject {
            message: raw.message.clone(),
            stack: raw
                .stack
                .as_deref()
                .map(|stack| self.translate_stack(&raw.name, &raw.message, stack)),
            name: raw.name.clone(),
            cause: raw.cause.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::{Mapping, SourceMapBuilder};

    const ENTRY: &str = "/work/app/emails/welcome.jsx";
    const MAP: &str = "/work/app/.preview-out/welcome.js.map";

    fn translator() -> SourceMapTranslator {
        let mut builder = SourceMapBuilder::new();
        let welcome = builder.add_source("../emails/welcome.jsx", None);
        let button = builder.add_source("../emails/components/button.jsx", None);
        builder.add_mapping(Mapping {
            generated_line: 9,
            generated_column: 0,
            source: welcome,
            original_line: 2,
            original_column: 2,
            name: None,
        });
        builder.add_mapping(Mapping {
            generated_line: 14,
            generated_column: 4,
            source: button,
            original_line: 0,
            original_column: 15,
            name: None,
        });
        let raw = builder.build(Some("welcome.js".into()));
        SourceMapTranslator::new(&raw, Path::new(MAP), Path::new(ENTRY))
    }

    #[test]
    fn test_parse_frames() {
        let frame = StackFrame::parse("    at Welcome (/work/app/emails/welcome.jsx:10:7)").unwrap();
        assert_eq!(frame.method.as_deref(), Some("Welcome"));
        assert_eq!(frame.file, ENTRY);
        assert_eq!((frame.line, frame.column), (10, Some(7)));

        let bare = StackFrame::parse("    at /work/app/emails/welcome.jsx:3").unwrap();
        assert_eq!(bare.method, None);
        assert_eq!(bare.column, None);

        assert!(StackFrame::parse("Error: boom").is_none());
    }

    #[test]
    fn test_source_map_is_rebased() {
        let translator = translator();
        let map = translator.source_map();
        assert_eq!(map.source_root.as_deref(), Some("/work/app"));
        assert_eq!(
            map.sources,
            vec![
                "/work/app/emails/welcome.jsx".to_string(),
                "/work/app/emails/components/button.jsx".to_string()
            ]
        );
    }

    #[test]
    fn test_translates_entry_frames() {
        let stack = format!(
            "    at Welcome ({entry}:10:9)\n    at <anonymous> ({entry}:15)\n    at render (/work/app/node_modules/x.js:4:2)\n",
            entry = ENTRY
        );
        let translated = translator().translate_stack("Error", "boom", &stack);
        assert_eq!(
            translated,
            "Error: boom\n    at Welcome (emails/welcome.jsx:3:2)\n    at emails/components/button.jsx:1:15\n    at render (/work/app/node_modules/x.js:4:2)"
        );
    }

    #[test]
    fn test_unmappable_frames_pass_through() {
        let stack = format!("    at helper ({}:2:1)", ENTRY);
        let translated = translator().translate_stack("TypeError", "x is undefined", &stack);
        assert_eq!(
            translated,
            format!("TypeError: x is undefined\n    at helper ({}:2:1)", ENTRY)
        );
    }

    #[test]
    fn test_translate_without_stack() {
        let raw = RawError {
            name: "Error".into(),
            message: "boom".into(),
            stack: None,
            cause: serde_json::Value::Null,
        };
        let object = translator().translate(&raw);
        assert_eq!(object.message, "boom");
        assert!(object.stack.is_none());
        assert!(object.cause.is_null());
    }
}
