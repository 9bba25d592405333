//! Segmentation of markdown / MDX documents into typed sections.
//!
//! A [`ParsedDocument`] is an ordered list of [`Section`]s. Sections never
//! overlap and never include the blank lines that separate them; the
//! reassembler puts one blank line back between every pair.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::DocError;
use crate::hash::content_hash;

mod component;
mod frontmatter;
mod parser;

pub use frontmatter::{FrontmatterField, parse_frontmatter_map, replace_field_values, translatable_fields};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    Frontmatter,
    Import,
    Heading { level: u8, title: String },
    Content,
    CodeBlock,
    Component { tag: String },
}

impl SectionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Frontmatter => "frontmatter",
            SectionKind::Import => "import",
            SectionKind::Heading { .. } => "heading",
            SectionKind::Content => "content",
            SectionKind::CodeBlock => "codeblock",
            SectionKind::Component { .. } => "component",
        }
    }

    /// Imports and code blocks are passed through verbatim.
    pub fn is_translatable(&self) -> bool {
        !matches!(self, SectionKind::Import | SectionKind::CodeBlock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub kind: SectionKind,
    pub text: String,
    /// 0-indexed, inclusive. Diagnostics only.
    pub start_line: usize,
    pub end_line: usize,
    /// Cleared for the current run when a cached translation is reused.
    pub translatable: bool,
}

impl Section {
    pub(crate) fn new(index: usize, kind: SectionKind, lines: &[&str], start: usize, end: usize) -> Self {
        let translatable = kind.is_translatable();
        Self {
            id: section_id(index),
            kind,
            text: lines[start..=end].join("\n"),
            start_line: start,
            end_line: end,
            translatable,
        }
    }

    pub fn heading_level(&self) -> Option<u8> {
        match &self.kind {
            SectionKind::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            SectionKind::Heading { title, .. } => Some(title.as_str()),
            _ => None,
        }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

pub(crate) fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

pub(crate) fn is_heading_line(line: &str) -> bool {
    parser::heading(line).is_some()
}

pub fn section_id(index: usize) -> String {
    format!("section-{}", index)
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub source_path: PathBuf,
    pub frontmatter: Option<BTreeMap<String, String>>,
    pub sections: Vec<Section>,
    pub content_hash: String,
}

impl ParsedDocument {
    /// Title from frontmatter, falling back to the first heading.
    pub fn title(&self) -> Option<String> {
        if let Some(title) = self
            .frontmatter
            .as_ref()
            .and_then(|map| map.get("title"))
            .filter(|value| !value.trim().is_empty())
        {
            return Some(title.clone());
        }
        self.sections
            .iter()
            .find_map(|section| section.title().map(str::to_string))
    }

    pub fn outline(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter_map(|section| match &section.kind {
                SectionKind::Heading { level, title } => {
                    Some(format!("{} {}", "#".repeat(*level as usize), title))
                }
                _ => None,
            })
            .collect()
    }
}

pub fn parse(path: &Path, raw: &str) -> Result<ParsedDocument, DocError> {
    let (sections, frontmatter) = parser::segment(raw).map_err(|stall| DocError::Parse {
        path: path.to_path_buf(),
        line: stall.line,
        message: stall.message,
    })?;
    Ok(ParsedDocument {
        source_path: path.to_path_buf(),
        frontmatter,
        sections,
        content_hash: content_hash(raw),
    })
}
