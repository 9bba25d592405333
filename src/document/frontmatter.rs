use std::collections::BTreeMap;

pub(crate) const DELIMITER: &str = "---";

pub(crate) fn is_delimiter(line: &str) -> bool {
    line.trim() == DELIMITER
}

/// Index of the closing delimiter when `lines` opens with a frontmatter block.
pub(crate) fn closing_delimiter(lines: &[&str]) -> Option<usize> {
    let first = lines.first()?;
    if !is_delimiter(first) {
        return None;
    }
    lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| is_delimiter(line))
        .map(|(idx, _)| idx)
}

/// Flat `key: value` map of a frontmatter payload. Nested or list lines are
/// ignored, and one level of matching quotes is stripped from values.
pub fn parse_frontmatter_map<'a, I>(lines: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = BTreeMap::new();
    for line in lines {
        if let Some(field) = split_field(line) {
            map.insert(field.key.to_string(), unquote(field.value).to_string());
        }
    }
    map
}

pub(crate) struct Field<'a> {
    pub(crate) key: &'a str,
    /// Whitespace between the colon and the value.
    pub(crate) gap: &'a str,
    pub(crate) value: &'a str,
}

pub(crate) fn split_field(line: &str) -> Option<Field<'_>> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (key, rest) = line.split_once(':')?;
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    let value = rest.trim_start();
    let gap = &rest[..rest.len() - value.len()];
    Some(Field {
        key,
        gap,
        value: value.trim_end(),
    })
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

pub(crate) fn quote_char(value: &str) -> Option<char> {
    let first = value.chars().next()?;
    if (first == '"' || first == '\'') && value.len() >= 2 && value.ends_with(first) {
        Some(first)
    } else {
        None
    }
}

pub(crate) fn unquote(value: &str) -> &str {
    match quote_char(value) {
        Some(_) => &value[1..value.len() - 1],
        None => value,
    }
}

/// Re-applies the quoting of `original` to a replacement value. Plain values
/// that would no longer parse as a YAML scalar get double quotes.
pub(crate) fn requote(original: &str, value: &str) -> String {
    match quote_char(original) {
        Some('\'') => format!("'{}'", value.replace('\'', "''")),
        Some(_) => double_quote(value),
        None if needs_quotes(value) => double_quote(value),
        None => value.to_string(),
    }
}

fn double_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn needs_quotes(value: &str) -> bool {
    value.contains(": ")
        || value.contains(" #")
        || value.ends_with(':')
        || value.starts_with(['[', ']', '{', '}', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`', '#', '-'])
}

/// Block scalar headers (`|`, `>-`, `|2+`, ...) and flow collections. Their
/// payload is not on the key's line, or is not a single scalar.
fn is_structured_value(value: &str) -> bool {
    let head = value.split(" #").next().unwrap_or(value).trim_end();
    if let Some(modifiers) = head.strip_prefix(['|', '>']) {
        return modifiers
            .chars()
            .all(|ch| ch == '+' || ch == '-' || ch.is_ascii_digit());
    }
    value.starts_with(['[', '{'])
}

/// A translatable `key: value` line of a frontmatter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterField {
    pub line: usize,
    pub key: String,
    /// Value with quotes stripped.
    pub value: String,
}

/// Fields of a frontmatter section whose key is in `keys` and whose value is
/// not empty.
pub fn translatable_fields(section_text: &str, keys: &[String]) -> Vec<FrontmatterField> {
    section_text
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !is_delimiter(line))
        .filter_map(|(idx, line)| {
            let field = split_field(line)?;
            if !keys.iter().any(|key| key == field.key) {
                return None;
            }
            if is_structured_value(field.value) {
                return None;
            }
            let value = unquote(field.value);
            if value.trim().is_empty() {
                return None;
            }
            Some(FrontmatterField {
                line: idx,
                key: field.key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Replaces field values by line index, keeping each line's key, spacing and
/// quoting.
pub fn replace_field_values(section_text: &str, values: &BTreeMap<usize, String>) -> String {
    section_text
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let Some(replacement) = values.get(&idx) else {
                return line.to_string();
            };
            match split_field(line) {
                Some(field) => format!(
                    "{}:{}{}",
                    field.key,
                    field.gap,
                    requote(field.value, replacement.trim())
                ),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
