use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const PROJECT_SETTINGS: &str = "llm-docs-translator.toml";
const PROJECT_LOCAL_SETTINGS: &str = "llm-docs-translator.local.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_dir: String,
    pub target_dir: String,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
    pub source_lang: String,
    pub target_langs: Vec<String>,
    pub model: Option<String>,
    pub max_tokens_per_chunk: usize,
    pub concurrency: usize,
    pub request_delay_ms: u64,
    pub max_retries: usize,
    pub frontmatter_keys: Vec<String>,
    pub cache_path: PathBuf,
    pub glossary_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: "docs/{lang}".to_string(),
            target_dir: "docs/{lang}".to_string(),
            extensions: vec!["md".to_string(), "mdx".to_string()],
            ignore: Vec::new(),
            source_lang: "zh".to_string(),
            target_langs: vec!["en".to_string()],
            model: None,
            max_tokens_per_chunk: 2000,
            concurrency: 2,
            request_delay_ms: 500,
            max_retries: 2,
            frontmatter_keys: vec![
                "title".to_string(),
                "description".to_string(),
                "sidebar_label".to_string(),
            ],
            cache_path: PathBuf::from(".translation-cache.json"),
            glossary_path: PathBuf::from("glossary.json"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    docs: Option<DocsSettings>,
    translation: Option<TranslationSettings>,
    cache: Option<CacheSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct DocsSettings {
    source_dir: Option<String>,
    target_dir: Option<String>,
    extensions: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
    source_lang: Option<String>,
    target_langs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    model: Option<String>,
    max_tokens_per_chunk: Option<usize>,
    concurrency: Option<usize>,
    request_delay_ms: Option<u64>,
    max_retries: Option<usize>,
    frontmatter_keys: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSettings {
    path: Option<String>,
    glossary_path: Option<String>,
}

/// Embedded defaults, then project files in the working directory, then
/// `extra_path`.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_in(Path::new("."), extra_path)
}

pub fn load_settings_in(project_dir: &Path, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let embedded: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse embedded settings")?;
    settings.merge(embedded);

    let mut ordered_paths = vec![
        project_dir.join(PROJECT_SETTINGS),
        project_dir.join(PROJECT_LOCAL_SETTINGS),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(docs) = incoming.docs {
            merge_text(&mut self.source_dir, docs.source_dir);
            merge_text(&mut self.target_dir, docs.target_dir);
            merge_text(&mut self.source_lang, docs.source_lang);
            if let Some(extensions) = docs.extensions {
                let extensions = clean_list(extensions, |ext| ext.trim_start_matches('.'));
                if !extensions.is_empty() {
                    self.extensions = extensions;
                }
            }
            if let Some(ignore) = docs.ignore {
                self.ignore = clean_list(ignore, |pattern| pattern);
            }
            if let Some(langs) = docs.target_langs {
                self.target_langs = clean_list(langs, |lang| lang);
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(model) = translation.model
                && !model.trim().is_empty()
            {
                self.model = Some(model.trim().to_string());
            }
            merge_positive(&mut self.max_tokens_per_chunk, translation.max_tokens_per_chunk);
            merge_positive(&mut self.concurrency, translation.concurrency);
            if let Some(delay) = translation.request_delay_ms {
                self.request_delay_ms = delay;
            }
            if let Some(retries) = translation.max_retries {
                self.max_retries = retries;
            }
            if let Some(keys) = translation.frontmatter_keys {
                self.frontmatter_keys = clean_list(keys, |key| key);
            }
        }
        if let Some(cache) = incoming.cache {
            if let Some(path) = cache.path
                && !path.trim().is_empty()
            {
                self.cache_path = PathBuf::from(path.trim());
            }
            if let Some(path) = cache.glossary_path
                && !path.trim().is_empty()
            {
                self.glossary_path = PathBuf::from(path.trim());
            }
        }
    }
}

fn merge_text(slot: &mut String, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *slot = value.trim().to_string();
    }
}

fn merge_positive(slot: &mut usize, value: Option<usize>) {
    if let Some(value) = value
        && value > 0
    {
        *slot = value;
    }
}

fn clean_list(values: Vec<String>, shape: impl Fn(&str) -> &str) -> Vec<String> {
    values
        .iter()
        .map(|value| shape(value.trim()).to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
