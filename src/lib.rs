use anyhow::{Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod cache;
pub mod chunker;
pub mod document;
pub mod error;
pub mod glossary;
pub mod hash;
pub mod logging;
pub mod orchestrator;
pub mod paths;
mod providers;
pub mod reassemble;
pub mod settings;
pub mod translations;
mod translator;

#[cfg(test)]
mod test_util;

pub use cache::CacheStore;
pub use error::DocError;
pub use glossary::{GlossaryEntry, GlossaryStore};
pub use orchestrator::{
    FileJob, FileOutcome, LanguageReport, OrchestratorOptions, TranslationOrchestrator,
};
pub use providers::{
    OpenAI, Provider, ProviderFuture, ProviderResponse, ProviderUsage, ToolSpec,
};
pub use settings::Settings;
pub use translator::{DocumentTranslator, LlmTranslator, TranslateContext, TranslateFuture};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Overrides `[docs] source_lang`.
    pub source_lang: Option<String>,
    /// Overrides `[docs] target_langs` when not empty.
    pub target_langs: Vec<String>,
    /// Translate only this source file.
    pub file: Option<PathBuf>,
    pub dry_run: bool,
    pub force: bool,
    pub clear_cache: bool,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub concurrency: Option<usize>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub languages: Vec<LanguageReport>,
    pub cache_cleared: bool,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.languages.iter().any(LanguageReport::has_failures)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cache_cleared {
            return write!(f, "translation cache cleared");
        }
        let mut lines = Vec::new();
        for report in &self.languages {
            lines.push(report.to_string());
            for failure in &report.failures {
                lines.push(format!("  failed {}: {}", failure.source_path.display(), failure.error));
            }
        }
        write!(f, "{}", lines.join("\n"))
    }
}

pub async fn run(config: Config) -> Result<RunReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.clear_cache {
        let mut cache = CacheStore::load(&settings.cache_path);
        cache.clear();
        cache.save()?;
        info!("cleared translation cache at {}", settings.cache_path.display());
        return Ok(RunReport {
            languages: Vec::new(),
            cache_cleared: true,
        });
    }

    let source_lang = config
        .source_lang
        .clone()
        .filter(|lang| !lang.trim().is_empty())
        .unwrap_or_else(|| settings.source_lang.clone());
    let target_langs = target_languages(&config, &settings, &source_lang)?;

    let key = match providers::resolve_key(config.key.as_deref()) {
        Ok(key) => key,
        // Nothing is sent in a dry run.
        Err(_) if config.dry_run => String::new(),
        Err(err) => return Err(err),
    };
    let model = match config.model.as_deref() {
        Some(arg) => providers::parse_model_arg(arg)?,
        None => None,
    }
    .or_else(|| settings.model.clone())
    .unwrap_or_else(|| providers::DEFAULT_MODEL.to_string());
    let translator = LlmTranslator::new(OpenAI::new(key).with_model(model));

    let options = OrchestratorOptions {
        max_tokens_per_chunk: settings.max_tokens_per_chunk,
        concurrency: config.concurrency.filter(|n| *n > 0).unwrap_or(settings.concurrency),
        request_delay: Duration::from_millis(config.delay_ms.unwrap_or(settings.request_delay_ms)),
        max_retries: settings.max_retries,
        frontmatter_keys: settings.frontmatter_keys.clone(),
        force: config.force,
        dry_run: config.dry_run,
        ..OrchestratorOptions::default()
    };
    let cache = CacheStore::load(&settings.cache_path);
    let glossary = GlossaryStore::load(&settings.glossary_path);
    let mut orchestrator = TranslationOrchestrator::new(translator, cache, glossary, options);

    let mut report = RunReport::default();
    let mut planning_error = None;
    for target_lang in &target_langs {
        match plan_jobs(&settings, &source_lang, target_lang, config.file.as_deref()) {
            Ok(jobs) => {
                info!("[{}] {} documents to check", target_lang, jobs.len());
                report
                    .languages
                    .push(orchestrator.run_language(target_lang, &jobs).await);
            }
            Err(err) => {
                planning_error = Some(err);
                break;
            }
        }
    }
    orchestrator.shutdown()?;
    match planning_error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

fn target_languages(config: &Config, settings: &Settings, source_lang: &str) -> Result<Vec<String>> {
    let requested = if config.target_langs.is_empty() {
        settings.target_langs.clone()
    } else {
        config.target_langs.clone()
    };
    let mut langs: Vec<String> = Vec::new();
    for lang in requested {
        let lang = lang.trim().to_string();
        if lang.is_empty() || langs.contains(&lang) {
            continue;
        }
        if lang.eq_ignore_ascii_case(source_lang) {
            warn!("skipping target language '{}': same as the source language", lang);
            continue;
        }
        langs.push(lang);
    }
    if langs.is_empty() {
        return Err(anyhow!("no target languages to translate into"));
    }
    Ok(langs)
}

/// Jobs for one target language: every discovered document, or just `file`.
pub fn plan_jobs(
    settings: &Settings,
    source_lang: &str,
    target_lang: &str,
    file: Option<&Path>,
) -> Result<Vec<FileJob>> {
    let source_root = paths::resolve_lang_dir(&settings.source_dir, source_lang);
    let target_root = paths::resolve_lang_dir(&settings.target_dir, target_lang);
    if source_root == target_root {
        return Err(anyhow!(
            "source and target directories are both {}",
            source_root.display()
        ));
    }

    if let Some(file) = file {
        if !file.is_file() {
            return Err(anyhow!("file not found: {}", file.display()));
        }
        let relative = paths::relative_to(&source_root, file)?;
        return Ok(vec![FileJob {
            source_path: file.to_path_buf(),
            target_path: target_root.join(&relative),
            cache_key: paths::cache_key(&relative, target_lang),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }]);
    }

    let filter = paths::DocFilter::new(&settings.extensions, &settings.ignore)?;
    let documents = paths::discover_documents(&source_root, &filter)?;
    Ok(documents
        .iter()
        .map(|relative| FileJob::new(&source_root, &target_root, relative, source_lang, target_lang))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn settings_in(root: &Path) -> Settings {
        Settings {
            source_dir: format!("{}/docs/{{lang}}", root.display()),
            target_dir: format!("{}/i18n/{{lang}}", root.display()),
            ..Settings::default()
        }
    }

    #[test]
    fn plans_jobs_for_discovered_documents() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir_all(dir.path().join("docs/zh/guide")).unwrap();
        fs::write(dir.path().join("docs/zh/guide/intro.md"), "# 介绍\n").unwrap();
        fs::write(dir.path().join("docs/zh/index.mdx"), "# 首页\n").unwrap();

        let jobs = plan_jobs(&settings, "zh", "en", None).unwrap();
        let keys: Vec<_> = jobs.iter().map(|job| job.cache_key.as_str()).collect();
        assert_eq!(keys, vec!["guide/intro.md#en", "index.mdx#en"]);
        assert_eq!(jobs[0].target_path, dir.path().join("i18n/en/guide/intro.md"));
    }

    #[test]
    fn plans_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir_all(dir.path().join("docs/zh/guide")).unwrap();
        let file = dir.path().join("docs/zh/guide/intro.md");
        fs::write(&file, "# 介绍\n").unwrap();

        let jobs = plan_jobs(&settings, "zh", "ja", Some(&file)).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].cache_key, "guide/intro.md#ja");
        assert_eq!(jobs[0].target_path, dir.path().join("i18n/ja/guide/intro.md"));
        assert!(plan_jobs(&settings, "zh", "ja", Some(&dir.path().join("nope.md"))).is_err());
    }

    #[test]
    fn single_file_keeps_its_nesting_when_spelled_differently() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir_all(dir.path().join("docs/zh/guide")).unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("docs/zh/guide/intro.md"), "# 介绍\n").unwrap();
        fs::write(dir.path().join("notes/intro.md"), "# 笔记\n").unwrap();

        let dotted = dir.path().join("notes/../docs/zh/guide/intro.md");
        let jobs = plan_jobs(&settings, "zh", "en", Some(&dotted)).unwrap();
        assert_eq!(jobs[0].cache_key, "guide/intro.md#en");
        assert_eq!(jobs[0].target_path, dir.path().join("i18n/en/guide/intro.md"));

        let outside = dir.path().join("notes/intro.md");
        assert!(plan_jobs(&settings, "zh", "en", Some(&outside)).is_err());
    }

    #[test]
    fn refuses_identical_roots() {
        let settings = Settings {
            source_dir: "docs".to_string(),
            target_dir: "docs".to_string(),
            ..Settings::default()
        };
        assert!(plan_jobs(&settings, "zh", "en", None).is_err());
    }

    #[test]
    fn target_languages_are_deduplicated() {
        let config = Config {
            target_langs: vec!["en".to_string(), "zh".to_string(), " en ".to_string(), "ja".to_string()],
            ..Config::default()
        };
        let langs = target_languages(&config, &Settings::default(), "zh").unwrap();
        assert_eq!(langs, vec!["en", "ja"]);

        let only_source = Config {
            target_langs: vec!["zh".to_string()],
            ..Config::default()
        };
        assert!(target_languages(&only_source, &Settings::default(), "zh").is_err());
    }
}
