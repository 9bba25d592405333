//! Greedy packing of sections into translator-sized chunks.

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::document::{Section, SectionKind};

const CJK_CHARS_PER_TOKEN: f64 = 1.5;
const OTHER_CHARS_PER_TOKEN: f64 = 4.0;
const MARKER_KEY: &str = "chunk-section";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// A single section copied through untouched.
    Passthrough,
    /// The frontmatter block, always alone in its chunk.
    Frontmatter,
    /// One or more consecutive translatable sections.
    Prose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub section_ids: Vec<String>,
    pub combined_text: String,
    pub estimated_tokens: usize,
}

impl Chunk {
    pub fn is_translatable(&self) -> bool {
        !matches!(self.kind, ChunkKind::Passthrough)
    }

    fn single(kind: ChunkKind, section: &Section) -> Self {
        Self {
            kind,
            section_ids: vec![section.id.clone()],
            combined_text: section.text.clone(),
            estimated_tokens: estimate_tokens(&section.text),
        }
    }
}

pub fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xF900..=0xFAFF
            | 0xFF00..=0xFFEF
    )
}

/// Rough token count: CJK characters at 1.5 per token, everything else at 4.
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), ch| {
        if is_cjk(ch) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    let estimate = cjk as f64 / CJK_CHARS_PER_TOKEN + other as f64 / OTHER_CHARS_PER_TOKEN;
    estimate.ceil() as usize
}

struct Pending<'a> {
    sections: Vec<&'a Section>,
    tokens: usize,
}

impl<'a> Pending<'a> {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            tokens: 0,
        }
    }

    fn flush_into(&mut self, chunks: &mut Vec<Chunk>) {
        if self.sections.is_empty() {
            return;
        }
        let sections = std::mem::take(&mut self.sections);
        let combined_text = if sections.len() == 1 {
            sections[0].text.clone()
        } else {
            sections
                .iter()
                .map(|section| format!("{}\n{}", marker_line(&section.id), section.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        chunks.push(Chunk {
            kind: ChunkKind::Prose,
            section_ids: sections.iter().map(|section| section.id.clone()).collect(),
            combined_text,
            estimated_tokens: self.tokens,
        });
        self.tokens = 0;
    }
}

/// Packs sections in order. Non-translatable sections, frontmatter and
/// sections larger than the budget each get a chunk of their own; oversized
/// sections are not split further.
pub fn chunk(sections: &[Section], max_tokens_per_chunk: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut pending = Pending::new();

    for section in sections {
        if !section.translatable {
            pending.flush_into(&mut chunks);
            chunks.push(Chunk::single(ChunkKind::Passthrough, section));
            continue;
        }
        if section.kind == SectionKind::Frontmatter {
            pending.flush_into(&mut chunks);
            chunks.push(Chunk::single(ChunkKind::Frontmatter, section));
            continue;
        }

        let tokens = estimate_tokens(&section.text);
        if tokens > max_tokens_per_chunk {
            pending.flush_into(&mut chunks);
            chunks.push(Chunk::single(ChunkKind::Prose, section));
            continue;
        }
        if pending.tokens + tokens > max_tokens_per_chunk {
            pending.flush_into(&mut chunks);
        }
        pending.sections.push(section);
        pending.tokens += tokens;
    }
    pending.flush_into(&mut chunks);
    chunks
}

fn marker_line(id: &str) -> String {
    format!("<!-- {}: {} -->", MARKER_KEY, id)
}

fn parse_marker(line: &str) -> Option<String> {
    let inner = line.trim().strip_prefix("<!--")?.strip_suffix("-->")?;
    let (key, id) = inner.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case(MARKER_KEY) {
        return None;
    }
    Some(id.trim().to_ascii_lowercase())
}

/// Splits a translated chunk back into `(section id, text)` pairs.
pub fn split_translation(chunk: &Chunk, translated: &str) -> Result<Vec<(String, String)>> {
    if chunk.section_ids.len() == 1 {
        return Ok(vec![(chunk.section_ids[0].clone(), translated.trim().to_string())]);
    }

    let mut parts: Vec<(String, Vec<&str>)> = Vec::new();
    for line in translated.lines() {
        if let Some(id) = parse_marker(line) {
            parts.push((id, Vec::new()));
            continue;
        }
        match parts.last_mut() {
            Some((_, lines)) => lines.push(line),
            None if line.trim().is_empty() => {}
            None => return Err(anyhow!("translated chunk has text before the first section marker")),
        }
    }

    if parts.len() != chunk.section_ids.len() {
        return Err(anyhow!(
            "expected {} section markers in translated chunk, found {}",
            chunk.section_ids.len(),
            parts.len()
        ));
    }
    parts
        .into_iter()
        .zip(&chunk.section_ids)
        .map(|((found, lines), expected)| {
            if found != expected.to_ascii_lowercase() {
                return Err(anyhow!(
                    "section marker mismatch (expected '{}', got '{}')",
                    expected,
                    found
                ));
            }
            Ok((expected.clone(), lines.join("\n").trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use std::path::Path;

    fn sections(raw: &str) -> Vec<Section> {
        document::parse(Path::new("doc.md"), raw).unwrap().sections
    }

    #[test]
    fn estimates_cjk_and_latin_separately() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("你好吗"), 2);
        // 3 / 1.5 + 4 / 4
        assert_eq!(estimate_tokens("你好吗abcd"), 3);
    }

    #[test]
    fn example_document_chunks() {
        let chunks = chunk(&sections("---\ntitle: X\n---\n# Hello\nworld\n"), 10_000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Frontmatter);
        let prose: Vec<_> = chunks
            .iter()
            .filter(|chunk| chunk.kind == ChunkKind::Prose)
            .collect();
        assert_eq!(prose.len(), 1);
        assert_eq!(prose[0].section_ids, vec!["section-1"]);
        assert_eq!(prose[0].combined_text, "# Hello\nworld");
    }

    #[test]
    fn passthrough_sections_break_runs() {
        let raw = "intro\n\n```\ncode\n```\n\n# B\nb\n\n# C\nc\n";
        let chunks = chunk(&sections(raw), 10_000);
        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.section_ids.clone()).collect();
        assert_eq!(
            ids,
            vec![
                vec!["section-0".to_string()],
                vec!["section-1".to_string()],
                vec!["section-2".to_string(), "section-3".to_string()],
            ]
        );
        assert!(!chunks[1].is_translatable());
        assert!(chunks[2].combined_text.starts_with("<!-- chunk-section: section-2 -->\n# B"));
    }

    #[test]
    fn chunks_respect_budget_and_isolate_oversized_sections() {
        let long = "word ".repeat(200);
        let raw = format!("# A\nshort\n\n# B\n{}\n\n# C\nshort\n\n# D\nshort\n", long);
        let secs = sections(&raw);
        let budget = 8;
        let chunks = chunk(&secs, budget);
        for chunk in &chunks {
            if chunk.section_ids.len() > 1 {
                assert!(chunk.estimated_tokens <= budget);
            }
        }
        let oversized = chunks
            .iter()
            .find(|chunk| chunk.section_ids.contains(&"section-1".to_string()))
            .unwrap();
        assert_eq!(oversized.section_ids.len(), 1);
        assert!(oversized.estimated_tokens > budget);

        let order: Vec<String> = chunks.iter().flat_map(|chunk| chunk.section_ids.clone()).collect();
        assert_eq!(order, vec!["section-0", "section-1", "section-2", "section-3"]);
    }

    #[test]
    fn split_round_trips_markers() {
        let chunk = chunk(&sections("# A\na\n\n# B\nb\n"), 10_000).remove(0);
        let translated = chunk.combined_text.to_uppercase();
        let parts = split_translation(&chunk, &translated).unwrap();
        assert_eq!(
            parts,
            vec![
                ("section-0".to_string(), "# A\nA".to_string()),
                ("section-1".to_string(), "# B\nB".to_string()),
            ]
        );
    }

    #[test]
    fn split_rejects_missing_markers() {
        let chunk = chunk(&sections("# A\na\n\n# B\nb\n"), 10_000).remove(0);
        let err = split_translation(&chunk, "# A\nA\n\n# B\nB").unwrap_err();
        assert!(err.to_string().contains("before the first section marker"));

        let err = split_translation(&chunk, "<!-- chunk-section: section-0 -->\nA").unwrap_err();
        assert!(err.to_string().contains("expected 2 section markers"));
    }
}
