//! Shared term table used to keep terminology consistent across documents.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cache::{now_rfc3339, write_atomic};
use crate::error::DocError;

pub const GLOSSARY_VERSION: &str = "1";

const SEED_JSON: &str = include_str!("seed.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl GlossaryEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            translations: BTreeMap::new(),
            category: None,
            context: None,
        }
    }

    pub fn with_translation(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.translations.insert(lang.into(), text.into());
        self
    }

    fn key(&self) -> String {
        term_key(&self.source)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlossaryFile {
    version: String,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    terms: Vec<GlossaryEntry>,
}

#[derive(Debug, Default)]
pub struct GlossaryStore {
    path: Option<PathBuf>,
    terms: BTreeMap<String, GlossaryEntry>,
    dirty: bool,
}

impl GlossaryStore {
    /// A store holding only the built-in seed terms, never persisted.
    pub fn seeded() -> Self {
        Self {
            path: None,
            terms: seed_terms(),
            dirty: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the persisted glossary. Missing or unreadable files fall back to
    /// the seed table; an outdated version keeps its terms on top of the seed.
    pub fn load(path: &Path) -> Self {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            terms: BTreeMap::new(),
            dirty: false,
        };
        match read_glossary_file(path) {
            Ok(None) => {
                debug!("no glossary at {}; using seed terms", path.display());
                store.terms = seed_terms();
            }
            Ok(Some(Loaded::Current(terms))) => {
                for entry in terms {
                    store.terms.insert(entry.key(), entry);
                }
            }
            Ok(Some(Loaded::Outdated(terms))) => {
                warn!(
                    "glossary {} has an incompatible version; merging {} custom terms over the seed",
                    path.display(),
                    terms.len()
                );
                store.terms = seed_terms();
                for entry in terms {
                    store.terms.insert(entry.key(), entry);
                }
                store.dirty = true;
            }
            Err(err) => {
                warn!("{}; using seed glossary", err);
                store.terms = seed_terms();
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, source: &str) -> Option<&GlossaryEntry> {
        self.terms.get(&term_key(source))
    }

    /// Adds a term, merging translations into an existing entry for the same
    /// (case-insensitive) source term.
    pub fn upsert(&mut self, entry: GlossaryEntry) {
        let key = entry.key();
        match self.terms.get_mut(&key) {
            Some(existing) => {
                existing.translations.extend(entry.translations);
                if entry.category.is_some() {
                    existing.category = entry.category;
                }
                if entry.context.is_some() {
                    existing.context = entry.context;
                }
            }
            None => {
                self.terms.insert(key, entry);
            }
        }
        self.dirty = true;
    }

    /// Source term to target term for every entry translated into
    /// `target_lang`. The source side uses the entry's `source_lang`
    /// translation when it has one.
    pub fn terms_for(&self, source_lang: &str, target_lang: &str) -> BTreeMap<String, String> {
        self.terms
            .values()
            .filter_map(|entry| {
                let target = entry.translations.get(target_lang)?;
                let source = entry
                    .translations
                    .get(source_lang)
                    .unwrap_or(&entry.source);
                if source.trim().is_empty() || target.trim().is_empty() {
                    return None;
                }
                Some((source.clone(), target.clone()))
            })
            .collect()
    }

    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        let document = GlossaryFile {
            version: GLOSSARY_VERSION.to_string(),
            last_updated: Some(now_rfc3339()),
            terms: self.terms.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&document)
            .with_context(|| "failed to serialize glossary")?;
        write_atomic(&path, json.as_bytes())?;
        debug!("saved {} glossary terms to {}", self.terms.len(), path.display());
        self.dirty = false;
        Ok(())
    }
}

/// Keeps only the terms whose source side occurs in `text`, ignoring case.
pub fn relevant_terms(terms: &BTreeMap<String, String>, text: &str) -> BTreeMap<String, String> {
    let haystack = text.to_lowercase();
    terms
        .iter()
        .filter(|(source, _)| haystack.contains(&source.to_lowercase()))
        .map(|(source, target)| (source.clone(), target.clone()))
        .collect()
}

fn term_key(source: &str) -> String {
    source.trim().to_lowercase()
}

enum Loaded {
    Current(Vec<GlossaryEntry>),
    Outdated(Vec<GlossaryEntry>),
}

fn read_glossary_file(path: &Path) -> Result<Option<Loaded>, DocError> {
    if !path.exists() {
        return Ok(None);
    }
    let corrupt = |message: String| DocError::CacheCorruption {
        path: path.to_path_buf(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|err| corrupt(err.to_string()))?;
    let value: Value = serde_json::from_str(&raw).map_err(|err| corrupt(err.to_string()))?;
    let current = value.get("version").and_then(Value::as_str) == Some(GLOSSARY_VERSION);
    let terms = parse_terms(value.get("terms"));
    if current {
        Ok(Some(Loaded::Current(terms)))
    } else {
        Ok(Some(Loaded::Outdated(terms)))
    }
}

/// Entries that fail to deserialize are dropped individually.
fn parse_terms(value: Option<&Value>) -> Vec<GlossaryEntry> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<GlossaryEntry>(item.clone()).ok())
        .filter(|entry| !entry.source.trim().is_empty())
        .collect()
}

fn seed_terms() -> BTreeMap<String, GlossaryEntry> {
    let parsed: Result<GlossaryFile, _> = serde_json::from_str(SEED_JSON);
    match parsed {
        Ok(file) => file
            .terms
            .into_iter()
            .map(|entry| (entry.key(), entry))
            .collect(),
        Err(err) => {
            warn!("embedded glossary seed is invalid: {}", err);
            BTreeMap::new()
        }
    }
}
