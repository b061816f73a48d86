//! Line scanner that partitions text into semantic units
//!
//! Fenced code blocks, SQL statements and list blocks are atomic; everything
//! else is paragraph-delimited prose.

use super::ChunkKind;
use regex::Regex;
use std::sync::OnceLock;

/// One semantic unit of a document
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Unit {
    pub text: String,
    pub kind: ChunkKind,
}

fn sql_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:SELECT\b|(?i:select\s.*\bfrom\b)|(?i:insert\s+into\b)|(?i:update\s+\w+\s+set\b)|(?i:delete\s+from\b)|(?i:(?:create|alter|drop)\s+(?:table|index|view|schema|database|unique|or\s+replace)\b)|(?i:with\s+\w+\s+as\b))",
        )
        .expect("valid SQL start pattern")
    })
}

fn list_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+•]|\d{1,3}[.)])\s+\S").expect("valid list item pattern")
    })
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn starts_structure(line: &str) -> bool {
    fence_marker(line).is_some() || sql_start().is_match(line) || list_item().is_match(line)
}

/// Partition text into units, in document order
pub(crate) fn partition(text: &str) -> Vec<Unit> {
    let lines: Vec<&str> = text.lines().collect();
    let mut units = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_blank(line) {
            i += 1;
            continue;
        }

        let (end, kind) = if let Some(marker) = fence_marker(line) {
            (scan_fence(&lines, i, marker), ChunkKind::Code)
        } else if sql_start().is_match(line) {
            (scan_sql(&lines, i), ChunkKind::Sql)
        } else if list_item().is_match(line) {
            (scan_list(&lines, i), ChunkKind::List)
        } else {
            (scan_prose(&lines, i), ChunkKind::Prose)
        };

        let block = lines[i..end].join("\n");
        let block = block.trim_end();
        if !block.trim().is_empty() {
            units.push(Unit {
                text: block.to_string(),
                kind,
            });
        }
        i = end;
    }

    units
}

/// Through the closing fence (inclusive), or to the end when unterminated
fn scan_fence(lines: &[&str], start: usize, marker: &str) -> usize {
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim_start().starts_with(marker) {
            return start + 1 + offset + 1;
        }
    }
    lines.len()
}

/// Through a line ending in `;` (inclusive), or up to a blank line
fn scan_sql(lines: &[&str], start: usize) -> usize {
    let mut i = start;
    while i < lines.len() {
        if is_blank(lines[i]) {
            return i;
        }
        if lines[i].trim_end().ends_with(';') {
            return i + 1;
        }
        i += 1;
    }
    lines.len()
}

/// List items, blank lines between them, and indented continuations
fn scan_list(lines: &[&str], start: usize) -> usize {
    let mut i = start + 1;
    let mut end = i;
    while i < lines.len() {
        let line = lines[i];
        if list_item().is_match(line) || (line.starts_with([' ', '\t']) && !is_blank(line)) {
            end = i + 1;
        } else if !is_blank(line) {
            break;
        }
        i += 1;
    }
    end
}

/// Up to a blank line or the start of a structured block
fn scan_prose(lines: &[&str], start: usize) -> usize {
    let mut i = start + 1;
    while i < lines.len() {
        if is_blank(lines[i]) || starts_structure(lines[i]) {
            return i;
        }
        i += 1;
    }
    lines.len()
}
