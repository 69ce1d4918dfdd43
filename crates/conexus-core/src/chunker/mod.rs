//! Language-aware content chunker.
//!
//! Splits a file's bytes into an ordered sequence of `Chunk`s, one per
//! retrievable unit, according to the file's language family:
//!
//! - Code (Rust/Python/TS/JS/Go/C/C++/C#): one chunk per top-level
//!   structural element (function, struct/class/interface/...), with any
//!   gap between elements (imports, stray comments, top-level statements)
//!   folded into a `GenericWindow` chunk.
//! - Markdown: split at heading boundaries of depth ≤ 2.
//! - Structured data (JSON/YAML/TOML): split on top-level keys.
//! - Anything else (and any semantic chunk that ends up larger than
//!   [`MAX_CHUNK_LINES`]): a fixed 500-line sliding window with 50-line
//!   overlap.
//!
//! Every chunker here satisfies the same coverage contract: the union of
//! emitted line ranges equals `[1, line_count]` modulo whitespace-only
//! regions, and ranges never overlap (overlap only appears *within* the
//! sliding-window fallback, by design, as the mechanism for boundary
//! continuity -- those chunks are not claimed to be disjoint).

use crate::merkle::hash_bytes;
use crate::parser::StructuralElement;
use crate::types::{Chunk, ChunkKind, Language};

/// Sliding-window size, in lines, used by the fallback chunker and for
/// splitting any semantic chunk that exceeds it.
const MAX_CHUNK_LINES: u32 = 500;
/// Overlap, in lines, between consecutive sliding-window chunks.
const WINDOW_OVERLAP: u32 = 50;

/// Chunk a file's content according to its language family.
///
/// `elements` must be the output of [`crate::parser::parse_file`] for code
/// languages; it is ignored for Markdown, structured-data, and unknown
/// languages.
pub fn chunk_file(
    file_path: &str,
    content: &str,
    language: Language,
    elements: &[StructuralElement],
) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if language.is_code() {
        chunk_code(file_path, content, language, elements)
    } else if language == Language::Markdown {
        chunk_markdown(file_path, content, language)
    } else if language.is_structured_data() {
        chunk_structured(file_path, content, language)
    } else {
        let total_lines = line_count(content);
        sliding_window(file_path, content, language, 1, total_lines)
    }
}

// ---------------------------------------------------------------------------
// Code family
// ---------------------------------------------------------------------------

fn chunk_code(
    file_path: &str,
    content: &str,
    language: Language,
    elements: &[StructuralElement],
) -> Vec<Chunk> {
    let total_lines = line_count(content);
    let mut sorted: Vec<&StructuralElement> = elements.iter().collect();
    sorted.sort_by_key(|e| (e.line_start, e.line_end));

    let mut chunks = Vec::new();
    let mut cursor = 1u32;

    for elem in sorted {
        if elem.line_start > cursor {
            chunks.extend(gap_chunk(file_path, content, language, cursor, elem.line_start - 1));
        }

        let span = elem.line_end.saturating_sub(elem.line_start) + 1;
        if span > MAX_CHUNK_LINES {
            chunks.extend(sliding_window(file_path, content, language, elem.line_start, elem.line_end));
        } else if let Some(chunk) = make_chunk(file_path, content, language, elem.kind, elem.line_start, elem.line_end) {
            chunks.push(chunk);
        }

        cursor = elem.line_end.max(cursor) + 1;
    }

    if cursor <= total_lines {
        chunks.extend(gap_chunk(file_path, content, language, cursor, total_lines));
    }

    chunks
}

/// Turn a gap between structural elements into a `GenericWindow` chunk,
/// unless the gap is whitespace-only. Splits via the sliding window if the
/// gap itself exceeds [`MAX_CHUNK_LINES`].
fn gap_chunk(file_path: &str, content: &str, language: Language, start: u32, end: u32) -> Vec<Chunk> {
    if start > end {
        return Vec::new();
    }
    let (byte_start, byte_end) = line_range_to_bytes(content, start, end);
    if content[byte_start..byte_end].trim().is_empty() {
        return Vec::new();
    }

    let span = end.saturating_sub(start) + 1;
    if span > MAX_CHUNK_LINES {
        sliding_window(file_path, content, language, start, end)
    } else {
        make_chunk(file_path, content, language, ChunkKind::GenericWindow, start, end)
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn chunk_markdown(file_path: &str, content: &str, language: Language) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len() as u32;

    let heading_lines: Vec<u32> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| is_heading_depth_le_2(line).then_some(idx as u32 + 1))
        .collect();

    let mut chunks = Vec::new();

    if heading_lines.is_empty() {
        return split_oversized(file_path, content, language, ChunkKind::Section, 1, total_lines);
    }

    if let Some(&first) = heading_lines.first() {
        if first > 1 {
            chunks.extend(gap_chunk(file_path, content, language, 1, first - 1));
        }
    }

    for (i, &start) in heading_lines.iter().enumerate() {
        let end = heading_lines.get(i + 1).map_or(total_lines, |next| next - 1);
        chunks.extend(split_oversized(file_path, content, language, ChunkKind::Section, start, end));
    }

    chunks
}

fn is_heading_depth_le_2(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("# ") || trimmed.starts_with("## ") || trimmed == "#" || trimmed == "##"
}

// ---------------------------------------------------------------------------
// Structured data
// ---------------------------------------------------------------------------

fn chunk_structured(file_path: &str, content: &str, language: Language) -> Vec<Chunk> {
    let ranges = match language {
        Language::Json => json_top_level_ranges(content),
        Language::Toml => toml_top_level_ranges(content),
        Language::Yaml => yaml_top_level_ranges(content),
        _ => Vec::new(),
    };

    if ranges.is_empty() {
        let total_lines = line_count(content);
        return split_oversized(file_path, content, language, ChunkKind::TopLevelValue, 1, total_lines);
    }

    let mut chunks = Vec::new();
    for (start, end) in ranges {
        chunks.extend(split_oversized(file_path, content, language, ChunkKind::TopLevelValue, start, end));
    }
    chunks
}

/// Scan a JSON document for top-level object members, returning each
/// member's 1-indexed inclusive line range (key through value, excluding
/// the separating comma).
fn json_top_level_ranges(content: &str) -> Vec<(u32, u32)> {
    let bytes = content.as_bytes();
    let Some(first_non_ws) = bytes.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Vec::new();
    };
    if bytes[first_non_ws] != b'{' {
        return Vec::new();
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    let mut member_start: Option<usize> = None;
    let mut byte_ranges = Vec::new();

    for (idx, &b) in bytes.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                if depth == 1 && member_start.is_none() {
                    member_start = Some(idx);
                }
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = member_start.take() {
                        byte_ranges.push((start, idx));
                    }
                }
            }
            b',' if depth == 1 => {
                if let Some(start) = member_start.take() {
                    byte_ranges.push((start, idx));
                }
            }
            _ => {}
        }
    }

    byte_ranges
        .into_iter()
        .map(|(start, end)| byte_range_to_lines(content, start, end))
        .collect()
}

/// Scan a TOML document for `[table]` / `[[array_table]]` sections. Any
/// content before the first header is its own range (typically top-level
/// key/value pairs preceding the first table).
fn toml_top_level_ranges(content: &str) -> Vec<(u32, u32)> {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len() as u32;

    let header_lines: Vec<u32> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let trimmed = line.trim_start();
            (trimmed.starts_with('[') && !trimmed.starts_with("[\"")).then_some(idx as u32 + 1)
        })
        .collect();

    if header_lines.is_empty() {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    if header_lines[0] > 1 {
        ranges.push((1, header_lines[0] - 1));
    }

    for (i, &start) in header_lines.iter().enumerate() {
        let end = header_lines.get(i + 1).map_or(total_lines, |next| next - 1);
        ranges.push((start, end));
    }

    ranges
}

/// Scan a YAML document for zero-indent `key:` lines, treated as
/// top-level mapping keys.
fn yaml_top_level_ranges(content: &str) -> Vec<(u32, u32)> {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len() as u32;

    let key_lines: Vec<u32> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| is_yaml_top_level_key(line).then_some(idx as u32 + 1))
        .collect();

    if key_lines.is_empty() {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    for (i, &start) in key_lines.iter().enumerate() {
        let end = key_lines.get(i + 1).map_or(total_lines, |next| next - 1);
        ranges.push((start, end));
    }

    ranges
}

fn is_yaml_top_level_key(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) || line.starts_with('#') || line.starts_with("---") {
        return false;
    }
    let Some(colon) = line.find(':') else {
        return false;
    };
    let key = &line[..colon];
    !key.is_empty() && !key.contains(' ')
}

// ---------------------------------------------------------------------------
// Sliding window fallback
// ---------------------------------------------------------------------------

/// Produce a fixed 500-line window / 50-line overlap split of `[start, end]`.
fn sliding_window(file_path: &str, content: &str, language: Language, start: u32, end: u32) -> Vec<Chunk> {
    let step = MAX_CHUNK_LINES - WINDOW_OVERLAP;
    let mut chunks = Vec::new();
    let mut line = start;

    loop {
        let window_end = (line + MAX_CHUNK_LINES - 1).min(end);
        if let Some(chunk) = make_chunk(file_path, content, language, ChunkKind::GenericWindow, line, window_end) {
            chunks.push(chunk);
        }
        if window_end >= end {
            break;
        }
        line += step;
    }

    chunks
}

/// Emit a single chunk for `[start, end]` if it exceeds [`MAX_CHUNK_LINES`],
/// otherwise fall back to the sliding window.
fn split_oversized(
    file_path: &str,
    content: &str,
    language: Language,
    kind: ChunkKind,
    start: u32,
    end: u32,
) -> Vec<Chunk> {
    if start > end {
        return Vec::new();
    }
    let span = end.saturating_sub(start) + 1;
    if span > MAX_CHUNK_LINES {
        sliding_window(file_path, content, language, start, end)
    } else {
        make_chunk(file_path, content, language, kind, start, end).into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn make_chunk(
    file_path: &str,
    content: &str,
    language: Language,
    kind: ChunkKind,
    line_start: u32,
    line_end: u32,
) -> Option<Chunk> {
    let (byte_start, byte_end) = line_range_to_bytes(content, line_start, line_end);
    if byte_start >= byte_end {
        return None;
    }
    let text = &content[byte_start..byte_end];
    if text.trim().is_empty() {
        return None;
    }

    let content_hash = hash_bytes(text.as_bytes());
    let id = Chunk::compute_id(file_path, line_start, line_end, &content_hash);

    Some(Chunk {
        id,
        file_path: file_path.to_string(),
        line_start,
        line_end,
        byte_start,
        byte_end,
        kind,
        content: text.to_string(),
        language,
        content_hash,
    })
}

fn line_count(content: &str) -> u32 {
    let n = content.lines().count();
    n.max(1) as u32
}

/// Byte offset of the start of each line (0-indexed line number -> byte offset).
fn line_offsets(content: &str) -> Vec<usize> {
    let mut offsets = vec![0usize];
    for (idx, b) in content.bytes().enumerate() {
        if b == b'\n' {
            offsets.push(idx + 1);
        }
    }
    offsets
}

/// Convert a 1-indexed inclusive line range to a `[byte_start, byte_end)` span.
fn line_range_to_bytes(content: &str, line_start: u32, line_end: u32) -> (usize, usize) {
    let offsets = line_offsets(content);
    let start_idx = (line_start.saturating_sub(1)) as usize;
    let end_idx = line_end as usize;

    let byte_start = offsets.get(start_idx).copied().unwrap_or(content.len());
    let byte_end = offsets.get(end_idx).copied().unwrap_or(content.len());
    (byte_start.min(content.len()), byte_end.min(content.len()))
}

/// Convert a `[byte_start, byte_end)` span back to a 1-indexed inclusive line range.
fn byte_range_to_lines(content: &str, byte_start: usize, byte_end: usize) -> (u32, u32) {
    let line_start = content[..byte_start.min(content.len())].matches('\n').count() as u32 + 1;
    let end_probe = byte_end.min(content.len());
    let line_end = content[..end_probe].matches('\n').count() as u32 + 1;
    (line_start, line_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use std::path::Path;

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(chunk_file("empty.rs", "", Language::Rust, &[]).is_empty());
        assert!(chunk_file("empty.rs", "   \n\n", Language::Rust, &[]).is_empty());
    }

    #[test]
    fn rust_functions_become_function_chunks() {
        let src = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let elements = parse_file(Path::new("lib.rs"), src.as_bytes(), Language::Rust).expect("parse");
        let chunks = chunk_file("lib.rs", src, Language::Rust, &elements);

        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Function && c.content.contains("fn a")));
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Function && c.content.contains("fn b")));
    }

    #[test]
    fn code_coverage_is_contiguous() {
        let src = "use std::fmt;\n\nfn a() {\n    1\n}\n\n// trailing comment\nfn b() {\n    2\n}\n";
        let elements = parse_file(Path::new("lib.rs"), src.as_bytes(), Language::Rust).expect("parse");
        let chunks = chunk_file("lib.rs", src, Language::Rust, &elements);

        let mut ranges: Vec<(u32, u32)> = chunks.iter().map(|c| (c.line_start, c.line_end)).collect();
        ranges.sort();
        assert_eq!(ranges.first().expect("first chunk").0, 1);
        assert_eq!(ranges.last().expect("last chunk").1, line_count(src));
    }

    #[test]
    fn markdown_splits_on_h1_and_h2() {
        let src = "# Title\n\nIntro text.\n\n## Section A\n\nBody A\n\n## Section B\n\nBody B\n";
        let chunks = chunk_file("README.md", src, Language::Markdown, &[]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].content.starts_with("# Title"));
        assert!(chunks[1].content.starts_with("## Section A"));
        assert!(chunks[2].content.starts_with("## Section B"));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Section));
    }

    #[test]
    fn markdown_ignores_h3_as_split_point() {
        let src = "# Title\n\n### Not a split point\n\nmore text\n";
        let chunks = chunk_file("README.md", src, Language::Markdown, &[]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Not a split point"));
    }

    #[test]
    fn json_splits_on_top_level_keys() {
        let src = "{\n  \"name\": \"conexus\",\n  \"version\": \"0.1.0\",\n  \"nested\": {\"a\": 1, \"b\": 2}\n}\n";
        let chunks = chunk_file("pkg.json", src, Language::Json, &[]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::TopLevelValue));
        assert!(chunks[0].content.contains("\"name\""));
        assert!(chunks[2].content.contains("\"nested\""));
        assert!(chunks[2].content.contains("\"a\": 1"));
    }

    #[test]
    fn toml_splits_on_table_headers() {
        let src = "title = \"conexus\"\n\n[package]\nname = \"conexus\"\n\n[dependencies]\nserde = \"1\"\n";
        let chunks = chunk_file("Cargo.toml", src, Language::Toml, &[]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].content.contains("title ="));
        assert!(chunks[1].content.contains("[package]"));
        assert!(chunks[2].content.contains("[dependencies]"));
    }

    #[test]
    fn yaml_splits_on_top_level_keys() {
        let src = "name: conexus\nversion: 0.1.0\nsettings:\n  debug: true\n  level: 3\n";
        let chunks = chunk_file("config.yaml", src, Language::Yaml, &[]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].content.contains("debug: true"));
    }

    #[test]
    fn unknown_language_uses_sliding_window() {
        let lines: Vec<String> = (1..=1200).map(|i| format!("line {i}")).collect();
        let src = lines.join("\n");
        let chunks = chunk_file("data.bin", &src, Language::Unknown, &[]);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::GenericWindow));

        // Consecutive windows overlap by WINDOW_OVERLAP lines.
        for pair in chunks.windows(2) {
            assert!(pair[1].line_start <= pair[0].line_end);
        }
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let src = "fn a() {\n    1\n}\n";
        let elements = parse_file(Path::new("lib.rs"), src.as_bytes(), Language::Rust).expect("parse");
        let first = chunk_file("lib.rs", src, Language::Rust, &elements);
        let second = chunk_file("lib.rs", src, Language::Rust, &elements);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
        }
    }
}
