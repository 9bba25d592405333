use std::collections::HashMap;

use crate::document::{Section, is_fence_line, is_heading_line};

/// Rebuilds a document from its sections, preferring translated text by id.
///
/// Sections whose final text is blank are dropped. The remaining parts are
/// joined with one blank line and passed through [`normalize`].
pub fn reassemble(sections: &[Section], translated: &HashMap<String, String>) -> String {
    let parts: Vec<&str> = sections
        .iter()
        .map(|section| {
            translated
                .get(&section.id)
                .map(String::as_str)
                .unwrap_or(section.text.as_str())
        })
        .filter(|text| !text.trim().is_empty())
        .collect();
    normalize(&parts.join("\n\n"))
}

/// Whitespace normalization applied to every reassembled document. Running it
/// on its own output changes nothing.
pub fn normalize(text: &str) -> String {
    let collapsed = collapse_newlines(text);
    let tightened = tighten_structural_blanks(&collapsed);
    let body = tightened.trim_end_matches('\n');
    if body.is_empty() {
        return String::new();
    }
    format!("{}\n", body)
}

fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(ch);
    }
    out
}

fn is_structural(line: &str) -> bool {
    is_fence_line(line) || is_heading_line(line)
}

fn tighten_structural_blanks(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut idx = 0;
    while idx < lines.len() {
        if !lines[idx].trim().is_empty() {
            out.push(lines[idx]);
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < lines.len() && lines[idx].trim().is_empty() {
            idx += 1;
        }
        let run = &lines[start..idx];
        let before = start.checked_sub(1).map(|prev| lines[prev]);
        let after = lines.get(idx).copied();
        let adjacent = before.is_some_and(is_structural) || after.is_some_and(is_structural);
        if run.len() > 1 && adjacent {
            out.push("");
        } else {
            out.extend_from_slice(run);
        }
    }
    out.join("\n")
}
