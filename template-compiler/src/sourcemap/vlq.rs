//! Base64 VLQ codec for the `mappings` field of a v3 source map.

use thiserror::Error;

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VlqError {
    #[error("Invalid base64 character {0:?} in mappings")]
    InvalidCharacter(char),

    #[error("Unexpected end of VLQ segment")]
    UnexpectedEnd,

    #[error("Invalid segment with {0} fields")]
    InvalidSegment(usize),
}

/// One decoded mapping segment with absolute (not delta) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source: u32,
    pub original_line: u32,
    pub original_column: u32,
    pub name: Option<u32>,
}

/// Mappings grouped by generated line, each line sorted by generated column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMappings {
    pub lines: Vec<Vec<Mapping>>,
}

impl DecodedMappings {
    /// Greatest lower bound lookup: the last segment on `line` whose column is
    /// not past `column`. Falls back to the first segment of the line when the
    /// column precedes every segment.
    pub fn lookup(&self, line: u32, column: u32) -> Option<&Mapping> {
        let segments = self.lines.get(line as usize)?;
        if segments.is_empty() {
            return None;
        }
        let index = segments.partition_point(|m| m.generated_column <= column);
        if index == 0 {
            segments.first()
        } else {
            segments.get(index - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn base64_value(c: u8) -> Result<i64, VlqError> {
    match c {
        b'A'..=b'Z' => Ok((c - b'A') as i64),
        b'a'..=b'z' => Ok((c - b'a' + 26) as i64),
        b'0'..=b'9' => Ok((c - b'0' + 52) as i64),
        b'+' => Ok(62),
        b'/' => Ok(63),
        other => Err(VlqError::InvalidCharacter(other as char)),
    }
}

/// Decode the VLQ values of a single comma-separated segment.
pub fn decode_vlq_segment(segment: &str) -> Result<Vec<i64>, VlqError> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift: u32 = 0;
    let mut pending = false;

    for &byte in segment.as_bytes() {
        let digit = base64_value(byte)?;
        value += (digit & VLQ_BASE_MASK) << shift;
        pending = true;
        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += VLQ_BASE_SHIFT;
        } else {
            let negative = value & 1 == 1;
            let magnitude = value >> 1;
            values.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
            pending = false;
        }
    }

    if pending {
        return Err(VlqError::UnexpectedEnd);
    }
    Ok(values)
}

pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Decode a full `mappings` string. Segments without source information
/// (single-field segments) are skipped.
pub fn decode_vlq_mappings(mappings: &str) -> Result<DecodedMappings, VlqError> {
    let mut lines = Vec::new();
    let mut source: i64 = 0;
    let mut original_line: i64 = 0;
    let mut original_column: i64 = 0;
    let mut name: i64 = 0;

    for (line_index, line) in mappings.split(';').enumerate() {
        let mut generated_column: i64 = 0;
        let mut segments = Vec::new();

        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_vlq_segment(segment)?;
            match fields.len() {
                1 => {
                    generated_column += fields[0];
                }
                4 | 5 => {
                    generated_column += fields[0];
                    source += fields[1];
                    original_line += fields[2];
                    original_column += fields[3];
                    let segment_name = if fields.len() == 5 {
                        name += fields[4];
                        Some(name as u32)
                    } else {
                        None
                    };
                    segments.push(Mapping {
                        generated_line: line_index as u32,
                        generated_column: generated_column as u32,
                        source: source as u32,
                        original_line: original_line as u32,
                        original_column: original_column as u32,
                        name: segment_name,
                    });
                }
                other => return Err(VlqError::InvalidSegment(other)),
            }
        }

        segments.sort_by_key(|m| m.generated_column);
        lines.push(segments);
    }

    Ok(DecodedMappings { lines })
}

/// Encode mappings sorted by generated position into a `mappings` string.
pub fn encode_vlq_mappings(mappings: &[Mapping]) -> String {
    let mut out = String::new();
    let mut current_line = 0u32;
    let mut previous_column: i64 = 0;
    let mut previous_source: i64 = 0;
    let mut previous_line: i64 = 0;
    let mut previous_original_column: i64 = 0;
    let mut previous_name: i64 = 0;
    let mut first_in_line = true;

    for mapping in mappings {
        while current_line < mapping.generated_line {
            out.push(';');
            current_line += 1;
            previous_column = 0;
            first_in_line = true;
        }
        if !first_in_line {
            out.push(',');
        }
        first_in_line = false;

        encode_vlq(mapping.generated_column as i64 - previous_column, &mut out);
        previous_column = mapping.generated_column as i64;

        encode_vlq(mapping.source as i64 - previous_source, &mut out);
        previous_source = mapping.source as i64;

        encode_vlq(mapping.original_line as i64 - previous_line, &mut out);
        previous_line = mapping.original_line as i64;

        encode_vlq(
            mapping.original_column as i64 - previous_original_column,
            &mut out,
        );
        previous_original_column = mapping.original_column as i64;

        if let Some(name) = mapping.name {
            encode_vlq(name as i64 - previous_name, &mut out);
            previous_name = name as i64;
        }
    }

    out
}
