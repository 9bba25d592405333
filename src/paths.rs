//! Source and target locations of documentation files.

use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::path::{Component, Path, PathBuf};

const LANG_PLACEHOLDER: &str = "{lang}";

/// Expands `{lang}` and a leading `~` in a directory template.
pub fn resolve_lang_dir(template: &str, lang: &str) -> PathBuf {
    let replaced = template.trim().replace(LANG_PLACEHOLDER, lang);
    normalize_path(PathBuf::from(expand_tilde(&replaced)))
}

/// `guide/intro.md` + `en` -> `guide/intro.md#en`.
pub fn cache_key(relative: &Path, target_lang: &str) -> String {
    format!("{}#{}", slash_path(relative), target_lang)
}

pub fn document_type(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "md".to_string())
}

/// Path of `file` relative to `root`. Falls back to comparing canonical
/// paths, so absolute and `..` forms of the same location agree; a file
/// outside `root` is an error.
pub fn relative_to(root: &Path, file: &Path) -> Result<PathBuf> {
    let normalized_root = normalize_path(root.to_path_buf());
    let normalized_file = normalize_path(file.to_path_buf());
    if let Ok(rel) = normalized_file.strip_prefix(&normalized_root) {
        return Ok(rel.to_path_buf());
    }
    let canonical_root = fs::canonicalize(root)
        .with_context(|| format!("failed to resolve source directory {}", root.display()))?;
    let canonical_file = fs::canonicalize(file)
        .with_context(|| format!("failed to resolve {}", file.display()))?;
    canonical_file
        .strip_prefix(&canonical_root)
        .map(Path::to_path_buf)
        .map_err(|_| {
            anyhow!(
                "{} is outside the source directory {}",
                file.display(),
                root.display()
            )
        })
}

/// Extension and ignore-pattern filter for document discovery. Ignore
/// patterns follow `.gitignore` rules: `!` negates, a trailing `/` matches
/// directories only, and patterns without a slash match any base name.
#[derive(Debug, Clone)]
pub struct DocFilter {
    extensions: Vec<String>,
    patterns: Vec<IgnorePattern>,
}

#[derive(Debug, Clone)]
struct IgnorePattern {
    matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
    match_basename: bool,
}

impl DocFilter {
    pub fn new(extensions: &[String], ignore: &[String]) -> Result<Self> {
        let mut patterns = Vec::new();
        for raw in ignore {
            if let Some(pattern) = parse_pattern(raw)? {
                patterns.push(pattern);
            }
        }
        Ok(Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            patterns,
        })
    }

    pub fn has_document_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
    }

    /// `relative` is relative to the discovery root.
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        let rel = slash_path(relative);
        let name = relative
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("");
        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.dir_only && !is_dir {
                continue;
            }
            let subject = if pattern.match_basename { name } else { rel.as_str() };
            if pattern.matcher.is_match(subject) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }

    pub fn accepts(&self, relative: &Path) -> bool {
        self.has_document_extension(relative) && !self.is_ignored(relative, false)
    }
}

fn parse_pattern(raw: &str) -> Result<Option<IgnorePattern>> {
    let mut pattern = raw.trim();
    if pattern.is_empty() || pattern.starts_with('#') {
        return Ok(None);
    }
    let negated = match pattern.strip_prefix('!') {
        Some(stripped) => {
            pattern = stripped;
            true
        }
        None => false,
    };
    let dir_only = pattern.ends_with('/');
    pattern = pattern.trim_end_matches('/');
    let anchored = pattern.starts_with('/');
    pattern = pattern.trim_start_matches('/');
    if pattern.is_empty() {
        return Ok(None);
    }

    let match_basename = !anchored && !pattern.contains('/');
    let glob = if match_basename || anchored || pattern.starts_with("**/") {
        pattern.to_string()
    } else {
        format!("**/{}", pattern)
    };
    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .map_err(|err| anyhow!("invalid ignore pattern '{}': {}", raw, err))?
        .compile_matcher();

    Ok(Some(IgnorePattern {
        matcher,
        negated,
        dir_only,
        match_basename,
    }))
}

/// Every accepted document under `root`, relative to it, sorted. Ignored
/// directories are not descended into.
pub fn discover_documents(root: &Path, filter: &DocFilter) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(anyhow!("source directory not found: {}", root.display()));
    }
    let mut found = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(dir) = pending.pop() {
        let full = root.join(&dir);
        let entries = fs::read_dir(&full)
            .with_context(|| format!("failed to read directory: {}", full.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read directory: {}", full.display()))?;
            let relative = dir.join(entry.file_name());
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            if file_type.is_dir() {
                if !filter.is_ignored(&relative, true) {
                    pending.push(relative);
                }
            } else if filter.accepts(&relative) {
                found.push(relative);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        if component != Component::CurDir {
            normalized.push(component.as_os_str());
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if (value == "~" || value.starts_with("~/"))
        && let Ok(home) = std::env::var("HOME")
    {
        let home = home.trim();
        if !home.is_empty() {
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}
