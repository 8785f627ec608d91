//! Version 3 source maps: the serialized form the bundler emits and the
//! decoded form the translator queries.

mod vlq;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

pub use vlq::{
    decode_vlq_mappings, decode_vlq_segment, encode_vlq_mappings, DecodedMappings, Mapping,
    VlqError,
};

/// A source map exactly as serialized to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl RawSourceMap {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Point the map at absolute paths: `sourceRoot` becomes the directory two
    /// levels above the map file, and every source entry is resolved against
    /// the map's own directory.
    pub fn rebase(&mut self, map_path: &Path) {
        let map_dir = paths::parent_dir(map_path);
        let root = paths::normalize(&map_path.join("..").join(".."));

        self.source_root = Some(root.to_string_lossy().into_owned());
        self.sources = self
            .sources
            .iter()
            .map(|source| {
                let source_path = Path::new(source);
                let resolved = if source_path.is_absolute() {
                    paths::normalize(source_path)
                } else {
                    paths::normalize(&map_dir.join(source_path))
                };
                resolved.to_string_lossy().into_owned()
            })
            .collect();
    }

    pub fn source_root_path(&self) -> Option<PathBuf> {
        self.source_root.as_ref().map(PathBuf::from)
    }
}

/// Resolved position in an original source file. `line` is 1-based and
/// `column` 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// A source map with decoded mappings, ready for lookups.
#[derive(Debug, Clone)]
pub struct ParsedSourceMap {
    raw: RawSourceMap,
    mappings: DecodedMappings,
}

impl ParsedSourceMap {
    pub fn new(raw: RawSourceMap) -> Result<Self, VlqError> {
        let mappings = decode_vlq_mappings(&raw.mappings)?;
        Ok(Self { raw, mappings })
    }

    pub fn raw(&self) -> &RawSourceMap {
        &self.raw
    }

    /// Map a generated position (1-based line, 0-based column) back to its
    /// original source.
    pub fn original_position_for(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        if line == 0 {
            return None;
        }
        let mapping = self.mappings.lookup(line - 1, column)?;
        let source = self.raw.sources.get(mapping.source as usize)?.clone();
        let name = mapping
            .name
            .and_then(|index| self.raw.names.get(index as usize).cloned());

        Some(OriginalPosition {
            source,
            line: mapping.original_line + 1,
            column: mapping.original_column,
            name,
        })
    }
}

/// Accumulates sources and mappings while code is being generated.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<String>,
    contents: Vec<Option<String>>,
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, name: impl Into<String>, content: Option<String>) -> u32 {
        self.sources.push(name.into());
        self.contents.push(content);
        (self.sources.len() - 1) as u32
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        if self.mappings.last() == Some(&mapping) {
            return;
        }
        self.mappings.push(mapping);
    }

    pub fn build(mut self, file: Option<String>) -> RawSourceMap {
        self.mappings
            .sort_by_key(|m| (m.generated_line, m.generated_column));
        RawSourceMap {
            version: 3,
            file,
            source_root: None,
            sources: self.sources,
            sources_content: Some(self.contents),
            names: Vec::new(),
            mappings: encode_vlq_mappings(&self.mappings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> RawSourceMap {
        let mut builder = SourceMapBuilder::new();
        let source = builder.add_source("../emails/welcome.jsx", Some("line0\nline1".into()));
        builder.add_mapping(Mapping {
            generated_line: 4,
            generated_column: 2,
            source,
            original_line: 1,
            original_column: 0,
            name: None,
        });
        builder.build(Some("welcome.js".into()))
    }

    #[test]
    fn test_rebase_makes_sources_absolute() {
        let mut map = sample_map();
        map.rebase(Path::new("/work/app/.preview-out/welcome.js.map"));

        assert_eq!(map.source_root.as_deref(), Some("/work/app"));
        assert_eq!(map.sources, vec!["/work/app/emails/welcome.jsx".to_string()]);
    }

    #[test]
    fn test_json_uses_v3_field_names() {
        let json = sample_map().to_json();
        assert!(json.contains("\"sourcesContent\""));
        assert!(json.contains("\"version\":3"));

        let parsed = RawSourceMap::from_json(&json).unwrap();
        assert_eq!(parsed.sources, vec!["../emails/welcome.jsx".to_string()]);
    }

    #[test]
    fn test_original_position_lookup() {
        let parsed = ParsedSourceMap::new(sample_map()).unwrap();
        let position = parsed.original_position_for(5, 10).unwrap();
        assert_eq!(position.line, 2);
        assert_eq!(position.column, 0);
        assert_eq!(position.source, "../emails/welcome.jsx");
        assert!(parsed.original_position_for(1, 0).is_none());
    }
}
