//! Persistent per-file, per-section translation cache.
//!
//! The whole cache is one JSON document loaded once at start and written once
//! at shutdown. Anything unreadable is discarded rather than migrated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::document::Section;
use crate::error::DocError;
use crate::hash::content_hash;

pub const CACHE_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCacheEntry {
    pub id: String,
    pub source_hash: String,
    pub translated_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCacheEntry {
    pub source_hash: String,
    pub target_hash: String,
    pub source_lang: String,
    pub target_lang: String,
    pub translated_at: String,
    pub sections: Vec<SectionCacheEntry>,
}

impl FileCacheEntry {
    fn section(&self, id: &str) -> Option<&SectionCacheEntry> {
        self.sections.iter().find(|entry| entry.id == id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: String,
    #[serde(default)]
    files: BTreeMap<String, FileCacheEntry>,
}

/// A section's current content and what it rendered to in this run.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    pub id: String,
    pub content: String,
    pub translated_content: String,
}

#[derive(Debug, Default)]
pub struct CacheStore {
    path: Option<PathBuf>,
    files: BTreeMap<String, FileCacheEntry>,
    dirty: bool,
}

impl CacheStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache file, degrading to an empty cache on any problem.
    pub fn load(path: &Path) -> Self {
        let files = match read_cache_file(path) {
            Ok(Some(files)) => files,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!("{}; starting with an empty translation cache", err);
                BTreeMap::new()
            }
        };
        debug!("loaded {} cached file entries from {}", files.len(), path.display());
        Self {
            path: Some(path.to_path_buf()),
            files,
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entry(&self, key: &str) -> Option<&FileCacheEntry> {
        self.files.get(key)
    }

    /// False only when the cached entry has the same language pair and the
    /// same source hash.
    pub fn needs_file_translation(
        &self,
        key: &str,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> bool {
        let Some(entry) = self.files.get(key) else {
            return true;
        };
        !(entry.source_lang == source_lang
            && entry.target_lang == target_lang
            && entry.source_hash == content_hash(source_text))
    }

    /// The file's entry, if it was recorded for the same language pair.
    fn entry_for(&self, key: &str, source_lang: &str, target_lang: &str) -> Option<&FileCacheEntry> {
        self.files
            .get(key)
            .filter(|entry| entry.source_lang == source_lang && entry.target_lang == target_lang)
    }

    /// Ids whose content hash differs from the cached one. Unknown files,
    /// entries of another language pair and unknown ids count as changed.
    pub fn changed_section_ids(
        &self,
        key: &str,
        source_lang: &str,
        target_lang: &str,
        sections: &[Section],
    ) -> Vec<String> {
        let Some(entry) = self.entry_for(key, source_lang, target_lang) else {
            return sections.iter().map(|section| section.id.clone()).collect();
        };
        let cached: HashMap<&str, &str> = entry
            .sections
            .iter()
            .map(|section| (section.id.as_str(), section.source_hash.as_str()))
            .collect();
        sections
            .iter()
            .filter(|section| cached.get(section.id.as_str()) != Some(&section.content_hash().as_str()))
            .map(|section| section.id.clone())
            .collect()
    }

    pub fn cached_translation(
        &self,
        key: &str,
        source_lang: &str,
        target_lang: &str,
        section_id: &str,
    ) -> Option<&str> {
        self.entry_for(key, source_lang, target_lang)?
            .section(section_id)
            .map(|section| section.translated_content.as_str())
    }

    /// Translation of any cached section of the file with identical content,
    /// used when sections shift position between runs.
    pub fn cached_translation_for_content(
        &self,
        key: &str,
        source_lang: &str,
        target_lang: &str,
        content: &str,
    ) -> Option<&str> {
        let hash = content_hash(content);
        self.entry_for(key, source_lang, target_lang)?
            .sections
            .iter()
            .find(|section| section.source_hash == hash)
            .map(|section| section.translated_content.as_str())
    }

    pub fn record_file_translation(
        &mut self,
        key: &str,
        source_text: &str,
        output_text: &str,
        source_lang: &str,
        target_lang: &str,
        sections: Vec<SectionRecord>,
    ) {
        let sections = sections
            .into_iter()
            .map(|record| SectionCacheEntry {
                source_hash: content_hash(&record.content),
                id: record.id,
                translated_content: record.translated_content,
            })
            .collect();
        let entry = FileCacheEntry {
            source_hash: content_hash(source_text),
            target_hash: content_hash(output_text),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            translated_at: now_rfc3339(),
            sections,
        };
        self.files.insert(key.to_string(), entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.files.remove(key).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn clear(&mut self) {
        if !self.files.is_empty() {
            self.files.clear();
        }
        self.dirty = true;
    }

    /// Writes the cache if anything changed since load.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        let document = CacheFile {
            version: CACHE_VERSION.to_string(),
            files: self.files.clone(),
        };
        let json = serde_json::to_string_pretty(&document)
            .with_context(|| "failed to serialize translation cache")?;
        write_atomic(&path, json.as_bytes())?;
        debug!("saved {} cached file entries to {}", self.files.len(), path.display());
        self.dirty = false;
        Ok(())
    }
}

fn read_cache_file(path: &Path) -> Result<Option<BTreeMap<String, FileCacheEntry>>, DocError> {
    if !path.exists() {
        return Ok(None);
    }
    let corrupt = |message: String| DocError::CacheCorruption {
        path: path.to_path_buf(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|err| corrupt(err.to_string()))?;
    let value: Value = serde_json::from_str(&raw).map_err(|err| corrupt(err.to_string()))?;
    let version = value.get("version").and_then(Value::as_str);
    if version != Some(CACHE_VERSION) {
        return Err(corrupt(format!(
            "cache version {} does not match {}",
            version.unwrap_or("(missing)"),
            CACHE_VERSION
        )));
    }
    let parsed: CacheFile = serde_json::from_value(value).map_err(|err| corrupt(err.to_string()))?;
    Ok(Some(parsed.files))
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Writes through a temp file in the destination directory, then renames.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    let mut file = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
