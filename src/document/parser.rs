use std::collections::BTreeMap;

use super::component::{TagDepthScanner, opening_tag};
use super::frontmatter::{closing_delimiter, parse_frontmatter_map};
use super::{Section, SectionKind};

const FENCE: &str = "```";

#[derive(Debug)]
pub(crate) struct Stall {
    pub(crate) line: usize,
    pub(crate) message: String,
}

/// Caps the number of classification steps at twice the line count.
#[derive(Debug)]
pub(crate) struct ScanGuard {
    steps: usize,
    limit: usize,
}

impl ScanGuard {
    pub(crate) fn new(line_count: usize) -> Self {
        Self {
            steps: 0,
            limit: line_count.saturating_mul(2).max(1),
        }
    }

    pub(crate) fn tick(&mut self, line: usize) -> Result<(), Stall> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(Stall {
                line,
                message: format!("scan did not terminate after {} steps", self.limit),
            });
        }
        Ok(())
    }
}

pub(crate) type Segmented = (Vec<Section>, Option<BTreeMap<String, String>>);

pub(crate) fn segment(raw: &str) -> Result<Segmented, Stall> {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    if raw.ends_with('\n') {
        lines.pop();
    }
    let count = lines.len();

    let mut sections = Vec::new();
    let mut frontmatter = None;
    let mut cursor = 0;

    // Leading blank lines are dropped on reassembly, so they must not hide
    // the opening delimiter either.
    let lead = lines.iter().take_while(|line| is_blank(line)).count();
    if let Some(close) = closing_delimiter(&lines[lead..]).map(|close| close + lead) {
        frontmatter = Some(parse_frontmatter_map(lines[lead + 1..close].iter().copied()));
        sections.push(Section::new(0, SectionKind::Frontmatter, &lines, lead, close));
        cursor = close + 1;
    }

    let mut guard = ScanGuard::new(count);
    while cursor < count {
        guard.tick(cursor)?;
        let line = lines[cursor];
        if is_blank(line) {
            cursor += 1;
            continue;
        }

        let (kind, end) = if is_import(line) {
            (SectionKind::Import, import_end(&lines, cursor))
        } else if is_fence(line) {
            (SectionKind::CodeBlock, fence_end(&lines, cursor))
        } else if let Some(tag) = opening_tag(line) {
            let end = component_end(&lines, cursor, tag);
            (
                SectionKind::Component {
                    tag: tag.to_string(),
                },
                end,
            )
        } else if let Some((level, title)) = heading(line) {
            (SectionKind::Heading { level, title }, heading_end(&lines, cursor, level))
        } else {
            (SectionKind::Content, content_end(&lines, cursor))
        };

        // Every rule consumes at least the current line.
        let end = end.max(cursor);
        sections.push(Section::new(sections.len(), kind, &lines, cursor, end));
        cursor = end + 1;
    }

    Ok((sections, frontmatter))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn is_import(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("import ") || trimmed.starts_with("import{") || trimmed == "import"
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

pub(crate) fn heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.bytes().take_while(|byte| *byte == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let mut title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    if without_closing.is_empty() || without_closing.ends_with([' ', '\t']) {
        title = without_closing.trim_end();
    }
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title.to_string()))
}

fn is_trigger(line: &str) -> bool {
    is_import(line) || is_fence(line) || opening_tag(line).is_some() || heading(line).is_some()
}

fn trim_trailing_blank(lines: &[&str], start: usize, end: usize) -> usize {
    let mut end = end;
    while end > start && is_blank(lines[end]) {
        end -= 1;
    }
    end
}

fn import_end(lines: &[&str], start: usize) -> usize {
    let mut last = start;
    let mut open_braces = 0usize;
    let mut idx = start;
    while idx < lines.len() {
        let line = lines[idx];
        if open_braces > 0 {
            open_braces = brace_balance(line, open_braces);
            last = idx;
        } else if is_import(line) {
            open_braces = brace_balance(line, 0);
            last = idx;
        } else if !(is_blank(line) || is_comment(line)) {
            break;
        }
        idx += 1;
    }
    last
}

fn brace_balance(line: &str, open: usize) -> usize {
    line.chars().fold(open, |depth, ch| match ch {
        '{' => depth + 1,
        '}' => depth.saturating_sub(1),
        _ => depth,
    })
}

fn fence_end(lines: &[&str], start: usize) -> usize {
    match (start + 1..lines.len()).find(|idx| is_fence(lines[*idx])) {
        Some(close) => close,
        None => trim_trailing_blank(lines, start, lines.len() - 1),
    }
}

fn component_end(lines: &[&str], start: usize, tag: &str) -> usize {
    let mut scanner = TagDepthScanner::new(tag);
    match (start..lines.len()).find(|idx| scanner.feed(lines[*idx])) {
        Some(close) => close,
        None => trim_trailing_blank(lines, start, lines.len() - 1),
    }
}

fn heading_end(lines: &[&str], start: usize, level: u8) -> usize {
    let mut in_fence = false;
    let mut end = lines.len() - 1;
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((next_level, _)) = heading(line)
            && next_level <= level
        {
            end = idx - 1;
            break;
        }
    }
    trim_trailing_blank(lines, start, end)
}

fn content_end(lines: &[&str], start: usize) -> usize {
    let end = (start + 1..lines.len())
        .find(|idx| is_trigger(lines[*idx]))
        .map(|idx| idx - 1)
        .unwrap_or(lines.len() - 1);
    trim_trailing_blank(lines, start, end)
}
