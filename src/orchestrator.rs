//! Per-file translation jobs: cache check, section diff, chunked translation,
//! reassembly, write-out and cache update.

use anyhow::{Result, anyhow};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::cache::{CacheStore, SectionRecord};
use crate::chunker::{self, Chunk, ChunkKind};
use crate::document::{self, ParsedDocument, Section, replace_field_values, translatable_fields};
use crate::error::DocError;
use crate::glossary::{GlossaryStore, relevant_terms};
use crate::paths;
use crate::providers::retry::{RATE_LIMIT_BASE_DELAY, wait_with_backoff};
use crate::reassemble::reassemble;
use crate::translator::{DocumentTranslator, TranslateContext};

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub max_tokens_per_chunk: usize,
    pub concurrency: usize,
    /// Minimum gap between two outbound translator calls.
    pub request_delay: Duration,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub frontmatter_keys: Vec<String>,
    /// Ignore the cache and translate every section.
    pub force: bool,
    /// Plan only: no translator calls, no writes.
    pub dry_run: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 2000,
            concurrency: 2,
            request_delay: Duration::from_millis(500),
            max_retries: 2,
            retry_base_delay: RATE_LIMIT_BASE_DELAY,
            frontmatter_keys: vec![
                "title".to_string(),
                "description".to_string(),
                "sidebar_label".to_string(),
            ],
            force: false,
            dry_run: false,
        }
    }
}

/// One (source file, target language) unit of work.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub cache_key: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl FileJob {
    /// Builds the job for `relative` under the two language roots.
    pub fn new(
        source_root: &Path,
        target_root: &Path,
        relative: &Path,
        source_lang: &str,
        target_lang: &str,
    ) -> Self {
        Self {
            source_path: source_root.join(relative),
            target_path: target_root.join(relative),
            cache_key: paths::cache_key(relative, target_lang),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Start,
    FileCacheCheck,
    Skip,
    Parse,
    SectionDiff,
    SkipIfNoChange,
    ChunkAndTranslate,
    Reassemble,
    Write,
    RecordCache,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Start => "start",
            JobState::FileCacheCheck => "file-cache-check",
            JobState::Skip => "skip",
            JobState::Parse => "parse",
            JobState::SectionDiff => "section-diff",
            JobState::SkipIfNoChange => "skip-if-no-change",
            JobState::ChunkAndTranslate => "chunk-and-translate",
            JobState::Reassemble => "reassemble",
            JobState::Write => "write",
            JobState::RecordCache => "record-cache",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Translated {
        /// Sections sent to the translator (reused ones excluded).
        sections: usize,
        calls: usize,
    },
    Skipped,
    /// Dry run: what a real run would send.
    Planned { sections: usize, chunks: usize },
    Failed(DocError),
}

#[derive(Debug)]
pub struct JobFailure {
    pub source_path: PathBuf,
    pub error: DocError,
}

#[derive(Debug, Default)]
pub struct LanguageReport {
    pub target_lang: String,
    pub translated: usize,
    pub skipped: usize,
    pub planned: usize,
    pub failed: usize,
    pub failures: Vec<JobFailure>,
}

impl LanguageReport {
    pub fn new(target_lang: impl Into<String>) -> Self {
        Self {
            target_lang: target_lang.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, source_path: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Translated { .. } => self.translated += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Planned { .. } => self.planned += 1,
            FileOutcome::Failed(error) => {
                self.failed += 1;
                self.failures.push(JobFailure {
                    source_path: source_path.to_path_buf(),
                    error,
                });
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for LanguageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] translated: {}, skipped: {}, failed: {}",
            self.target_lang, self.translated, self.skipped, self.failed
        )?;
        if self.planned > 0 {
            write!(f, ", planned: {}", self.planned)?;
        }
        Ok(())
    }
}

/// Enforces a minimum delay between the starts of outbound calls.
#[derive(Debug)]
pub struct RequestPacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.delay;
            if ready > Instant::now() {
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

type ChunkOutput = (Vec<(String, String)>, usize);
type ChunkResult = std::result::Result<ChunkOutput, (Vec<String>, anyhow::Error)>;

pub struct TranslationOrchestrator<T: DocumentTranslator> {
    translator: T,
    cache: CacheStore,
    glossary: GlossaryStore,
    options: OrchestratorOptions,
    pacer: RequestPacer,
}

impl<T: DocumentTranslator> TranslationOrchestrator<T> {
    pub fn new(
        translator: T,
        cache: CacheStore,
        glossary: GlossaryStore,
        options: OrchestratorOptions,
    ) -> Self {
        let pacer = RequestPacer::new(options.request_delay);
        Self {
            translator,
            cache,
            glossary,
            options,
            pacer,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn glossary(&self) -> &GlossaryStore {
        &self.glossary
    }

    pub fn glossary_mut(&mut self) -> &mut GlossaryStore {
        &mut self.glossary
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Runs every job of one target language in order.
    pub async fn run_language(&mut self, target_lang: &str, jobs: &[FileJob]) -> LanguageReport {
        let mut report = LanguageReport::new(target_lang);
        for job in jobs {
            let outcome = self.translate_file(job).await;
            match &outcome {
                FileOutcome::Translated { sections, calls } => info!(
                    "translated {} -> {} ({} sections, {} calls)",
                    job.source_path.display(),
                    job.target_path.display(),
                    sections,
                    calls
                ),
                FileOutcome::Skipped => debug!("unchanged: {}", job.source_path.display()),
                FileOutcome::Planned { sections, chunks } => info!(
                    "[dry-run] would translate {} -> {} ({} sections in {} chunks)",
                    job.source_path.display(),
                    job.target_path.display(),
                    sections,
                    chunks
                ),
                FileOutcome::Failed(err) => error!("{} error: {}", err.kind(), err),
            }
            report.record(&job.source_path, outcome);
        }
        info!("{}", report);
        report
    }

    pub async fn translate_file(&mut self, job: &FileJob) -> FileOutcome {
        match self.run_job(job).await {
            Ok(outcome) => outcome,
            Err(err) => {
                transition(job, JobState::Failed);
                FileOutcome::Failed(err)
            }
        }
    }

    async fn run_job(&mut self, job: &FileJob) -> Result<FileOutcome, DocError> {
        transition(job, JobState::Start);
        let raw = fs::read_to_string(&job.source_path)
            .map_err(|err| DocError::io(&job.source_path, err))?;

        transition(job, JobState::FileCacheCheck);
        let unchanged = !self.options.force
            && !self.cache.needs_file_translation(
                &job.cache_key,
                &raw,
                &job.source_lang,
                &job.target_lang,
            );
        if unchanged && job.target_path.exists() {
            transition(job, JobState::Skip);
            return Ok(FileOutcome::Skipped);
        }
        if unchanged {
            debug!(
                "{} is missing; rebuilding from cached translations",
                job.target_path.display()
            );
        }

        transition(job, JobState::Parse);
        let mut doc = document::parse(&job.source_path, &raw)?;

        transition(job, JobState::SectionDiff);
        let mut translated = self.reuse_cached_sections(job, &mut doc.sections);
        let pending = doc.sections.iter().filter(|section| section.translatable).count();

        let mut calls = 0;
        if pending == 0 {
            transition(job, JobState::SkipIfNoChange);
        } else {
            transition(job, JobState::ChunkAndTranslate);
            let chunks: Vec<Chunk> = chunker::chunk(&doc.sections, self.options.max_tokens_per_chunk)
                .into_iter()
                .filter(Chunk::is_translatable)
                .collect();
            if self.options.dry_run {
                return Ok(FileOutcome::Planned {
                    sections: pending,
                    chunks: chunks.len(),
                });
            }
            let (pieces, used) = self.translate_chunks(job, &doc, chunks).await?;
            translated.extend(pieces);
            calls = used;
        }
        if self.options.dry_run {
            return Ok(FileOutcome::Planned {
                sections: 0,
                chunks: 0,
            });
        }

        transition(job, JobState::Reassemble);
        let output = reassemble(&doc.sections, &translated);

        transition(job, JobState::Write);
        write_output(&job.target_path, &output)?;

        transition(job, JobState::RecordCache);
        let records = doc
            .sections
            .iter()
            .map(|section| SectionRecord {
                id: section.id.clone(),
                content: section.text.clone(),
                translated_content: translated
                    .get(&section.id)
                    .cloned()
                    .unwrap_or_else(|| section.text.clone()),
            })
            .collect();
        self.cache.record_file_translation(
            &job.cache_key,
            &raw,
            &output,
            &job.source_lang,
            &job.target_lang,
            records,
        );

        transition(job, JobState::Done);
        Ok(FileOutcome::Translated {
            sections: pending,
            calls,
        })
    }

    /// Fills translations for unchanged (or moved) sections from the cache
    /// and clears their `translatable` flag for this run.
    fn reuse_cached_sections(
        &self,
        job: &FileJob,
        sections: &mut [Section],
    ) -> HashMap<String, String> {
        let mut translated = HashMap::new();
        if self.options.force {
            return translated;
        }
        let changed: HashSet<String> = self
            .cache
            .changed_section_ids(&job.cache_key, &job.source_lang, &job.target_lang, sections)
            .into_iter()
            .collect();
        for section in sections.iter_mut().filter(|section| section.translatable) {
            let reused = if changed.contains(&section.id) {
                self.cache.cached_translation_for_content(
                    &job.cache_key,
                    &job.source_lang,
                    &job.target_lang,
                    &section.text,
                )
            } else {
                self.cache.cached_translation(
                    &job.cache_key,
                    &job.source_lang,
                    &job.target_lang,
                    &section.id,
                )
            };
            if let Some(text) = reused {
                translated.insert(section.id.clone(), text.to_string());
                section.translatable = false;
            }
        }
        debug!(
            "{}: {} of {} sections reused from cache",
            job.cache_key,
            translated.len(),
            sections.len()
        );
        translated
    }

    async fn translate_chunks(
        &self,
        job: &FileJob,
        doc: &ParsedDocument,
        chunks: Vec<Chunk>,
    ) -> Result<(HashMap<String, String>, usize), DocError> {
        let base_context = TranslateContext {
            document_title: doc.title(),
            document_type: paths::document_type(&job.source_path),
            glossary: BTreeMap::new(),
            outline: doc.outline(),
        };
        let terms = self.glossary.terms_for(&job.source_lang, &job.target_lang);
        let worker = ChunkWorker {
            translator: &self.translator,
            pacer: &self.pacer,
            options: &self.options,
            source_lang: &job.source_lang,
            target_lang: &job.target_lang,
        };

        // The first failed chunk fails the file; chunks still queued are dropped.
        let results: Vec<ChunkOutput> = stream::iter(chunks)
            .map(|chunk| {
                let mut context = base_context.clone();
                context.glossary = relevant_terms(&terms, &chunk.combined_text);
                let worker = &worker;
                async move { worker.run(chunk, context).await }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .try_collect()
            .await
            .map_err(|(section_ids, source)| DocError::Translate {
                path: job.source_path.clone(),
                section_ids,
                source,
            })?;

        let mut translated = HashMap::new();
        let mut calls = 0;
        for (pieces, used) in results {
            calls += used;
            translated.extend(pieces);
        }
        Ok((translated, calls))
    }

    /// Writes the cache and glossary if they changed.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.options.dry_run {
            return Ok(());
        }
        self.cache.save()?;
        self.glossary.save()?;
        Ok(())
    }

    /// Empties the cache and writes it immediately.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.cache.clear();
        self.cache.save()
    }
}

struct ChunkWorker<'a, T: DocumentTranslator> {
    translator: &'a T,
    pacer: &'a RequestPacer,
    options: &'a OrchestratorOptions,
    source_lang: &'a str,
    target_lang: &'a str,
}

impl<T: DocumentTranslator> ChunkWorker<'_, T> {
    async fn run(&self, chunk: Chunk, context: TranslateContext) -> ChunkResult {
        let ids = chunk.section_ids.clone();
        let result = match chunk.kind {
            ChunkKind::Frontmatter => self.frontmatter(&chunk, &context).await,
            _ => self.prose(&chunk, &context).await,
        };
        result.map_err(|err| (ids, err))
    }

    async fn prose(&self, chunk: &Chunk, context: &TranslateContext) -> Result<(Vec<(String, String)>, usize)> {
        let translated = self.call(&chunk.combined_text, context).await?;
        Ok((chunker::split_translation(chunk, &translated)?, 1))
    }

    /// Translates the selected frontmatter values one by one.
    async fn frontmatter(&self, chunk: &Chunk, context: &TranslateContext) -> Result<(Vec<(String, String)>, usize)> {
        let id = chunk
            .section_ids
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("frontmatter chunk has no section"))?;
        let fields = translatable_fields(&chunk.combined_text, &self.options.frontmatter_keys);
        let mut values = BTreeMap::new();
        for field in &fields {
            let translated = self.call(&field.value, context).await?;
            let single_line = translated.lines().map(str::trim).collect::<Vec<_>>().join(" ");
            values.insert(field.line, single_line);
        }
        let text = replace_field_values(&chunk.combined_text, &values);
        Ok((vec![(id, text)], fields.len()))
    }

    async fn call(&self, text: &str, context: &TranslateContext) -> Result<String> {
        let mut attempt = 0usize;
        let mut delay = self.options.retry_base_delay;
        loop {
            self.pacer.wait().await;
            match self
                .translator
                .translate(text, self.source_lang, self.target_lang, context)
                .await
            {
                Ok(translated) => return Ok(translated),
                Err(err) if attempt < self.options.max_retries => {
                    attempt += 1;
                    let reason = format!("call failed ({:#})", err);
                    let next = wait_with_backoff(
                        "translator",
                        &reason,
                        attempt,
                        self.options.max_retries,
                        delay,
                        None,
                    )
                    .await;
                    // A zero base delay disables backoff entirely.
                    if !delay.is_zero() {
                        delay = next;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn transition(job: &FileJob, state: JobState) {
    debug!("{} -> {}", job.cache_key, state.as_str());
}

fn write_output(path: &Path, text: &str) -> Result<(), DocError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| DocError::io(parent, err))?;
    }
    fs::write(path, text).map_err(|err| DocError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FailingTranslator, FlakyTranslator, RecordingTranslator, UppercaseTranslator};

    struct Fixture {
        _dir: tempfile::TempDir,
        source_root: PathBuf,
        target_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source_root = dir.path().join("docs/zh");
            let target_root = dir.path().join("docs/en");
            fs::create_dir_all(&source_root).unwrap();
            Self {
                _dir: dir,
                source_root,
                target_root,
            }
        }

        fn write(&self, relative: &str, text: &str) -> FileJob {
            let path = self.source_root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, text).unwrap();
            FileJob::new(&self.source_root, &self.target_root, Path::new(relative), "zh", "en")
        }

        fn output(&self, relative: &str) -> String {
            fs::read_to_string(self.target_root.join(relative)).unwrap()
        }
    }

    fn options() -> OrchestratorOptions {
        OrchestratorOptions {
            request_delay: Duration::ZERO,
            retry_base_delay: Duration::ZERO,
            max_retries: 0,
            ..OrchestratorOptions::default()
        }
    }

    fn orchestrator<T: DocumentTranslator>(translator: T, options: OrchestratorOptions) -> TranslationOrchestrator<T> {
        TranslationOrchestrator::new(translator, CacheStore::in_memory(), GlossaryStore::empty(), options)
    }

    #[tokio::test]
    async fn example_document_end_to_end() {
        let fixture = Fixture::new();
        let job = fixture.write("intro.md", "---\ntitle: X\n---\n# Hello\nworld\n");
        let mut orch = orchestrator(UppercaseTranslator, options());

        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Translated { sections: 2, .. }));
        let output = fixture.output("intro.md");
        assert!(output.contains("WORLD"));
        assert!(output.contains("\ntitle: X\n"));
        assert_eq!(output, "---\ntitle: X\n---\n\n# HELLO\nWORLD\n");
        assert_eq!(orch.cache().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_file_makes_no_calls_on_second_run() {
        let fixture = Fixture::new();
        let job = fixture.write("a.md", "# A\na\n\n# B\nb\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, options());

        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Translated { .. }));
        let first = calls.lock().unwrap().len();
        assert_eq!(first, 1);

        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Skipped));
        assert_eq!(calls.lock().unwrap().len(), first);
    }

    #[tokio::test]
    async fn only_the_modified_section_is_retranslated() {
        let fixture = Fixture::new();
        let job = fixture.write("abc.md", "# A\nalpha\n\n# B\nbeta\n\n# C\ngamma\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let opts = OrchestratorOptions {
            max_tokens_per_chunk: 4,
            ..options()
        };
        let mut orch = orchestrator(translator, opts);
        orch.translate_file(&job).await;
        assert_eq!(calls.lock().unwrap().len(), 3);

        fixture.write("abc.md", "# A\nalpha\n\n# B\nbeta two\n\n# C\ngamma\n");
        calls.lock().unwrap().clear();
        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Translated { sections: 1, calls: 1 }));
        assert_eq!(*calls.lock().unwrap(), vec!["# B\nbeta two".to_string()]);
        assert_eq!(
            fixture.output("abc.md"),
            "[en] # A\nalpha\n\n[en] # B\nbeta two\n\n[en] # C\ngamma\n"
        );
    }

    #[tokio::test]
    async fn moved_section_reuses_its_translation() {
        let fixture = Fixture::new();
        let job = fixture.write("m.md", "# A\nalpha\n\n# B\nbeta\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, OrchestratorOptions { max_tokens_per_chunk: 4, ..options() });
        orch.translate_file(&job).await;

        fixture.write("m.md", "intro\n\n# A\nalpha\n\n# B\nbeta\n");
        calls.lock().unwrap().clear();
        orch.translate_file(&job).await;
        assert_eq!(*calls.lock().unwrap(), vec!["intro".to_string()]);
        assert_eq!(fixture.output("m.md"), "[en] intro\n\n[en] # A\nalpha\n\n[en] # B\nbeta\n");
    }

    #[tokio::test]
    async fn missing_target_is_rebuilt_from_cache() {
        let fixture = Fixture::new();
        let job = fixture.write("r.md", "# A\nalpha\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, options());
        orch.translate_file(&job).await;
        let expected = fixture.output("r.md");

        fs::remove_file(&job.target_path).unwrap();
        calls.lock().unwrap().clear();
        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Translated { sections: 0, calls: 0 }));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(fixture.output("r.md"), expected);
    }

    #[tokio::test]
    async fn force_ignores_the_cache() {
        let fixture = Fixture::new();
        let job = fixture.write("f.md", "# A\nalpha\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, OrchestratorOptions { force: true, ..options() });
        orch.translate_file(&job).await;
        orch.translate_file(&job).await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_file() {
        let fixture = Fixture::new();
        let bad = fixture.write("bad.md", "# Broken\nFAIL here\n");
        let good = fixture.write("good.md", "# Fine\ntext\n");
        let missing = FileJob::new(&fixture.source_root, &fixture.target_root, Path::new("none.md"), "zh", "en");
        let mut orch = orchestrator(FailingTranslator::on("FAIL"), options());

        let report = orch.run_language("en", &[bad.clone(), missing, good]).await;
        assert_eq!(report.translated, 1);
        assert_eq!(report.failed, 2);
        assert!(report.has_failures());
        assert_eq!(report.to_string(), "[en] translated: 1, skipped: 0, failed: 2");
        assert_eq!(report.failures[0].error.kind(), "translate");
        assert_eq!(report.failures[1].error.kind(), "io");
        assert!(!bad.target_path.exists());
        assert_eq!(fixture.output("good.md"), "# FINE\nTEXT\n");
        assert!(orch.cache().entry(&bad.cache_key).is_none());
    }

    #[tokio::test]
    async fn bounded_retry_recovers_from_transient_errors() {
        let fixture = Fixture::new();
        let job = fixture.write("t.md", "# A\nalpha\n");
        let mut orch = orchestrator(FlakyTranslator::failing_times(1), OrchestratorOptions { max_retries: 1, ..options() });
        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Translated { .. }));

        let job = fixture.write("u.md", "# B\nbeta\n");
        let mut orch = orchestrator(FlakyTranslator::failing_times(2), OrchestratorOptions { max_retries: 1, ..options() });
        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Failed(DocError::Translate { .. })));
    }

    #[tokio::test]
    async fn frontmatter_translates_selected_keys_only() {
        let fixture = Fixture::new();
        let job = fixture.write(
            "fm.md",
            "---\ntitle: 'hello'\nslug: /hello\ndescription: \"intro\"\n---\n\nbody\n",
        );
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, options());
        orch.translate_file(&job).await;

        let mut seen = calls.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["body", "hello", "intro"]);
        assert_eq!(
            fixture.output("fm.md"),
            "---\ntitle: '[en] hello'\nslug: /hello\ndescription: \"[en] intro\"\n---\n\n[en] body\n"
        );
    }

    #[tokio::test]
    async fn folded_frontmatter_values_keep_their_block() {
        let fixture = Fixture::new();
        let job = fixture.write(
            "folded.md",
            "---\ntitle: 你好\ndescription: >\n  多行描述\n  第二行\n---\n\nbody\n",
        );
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, options());
        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Translated { .. }));

        let mut seen = calls.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["body", "你好"]);
        assert_eq!(
            fixture.output("folded.md"),
            "---\ntitle: \"[en] 你好\"\ndescription: >\n  多行描述\n  第二行\n---\n\n[en] body\n"
        );
    }

    #[tokio::test]
    async fn unwritable_target_fails_without_caching() {
        let fixture = Fixture::new();
        let job = fixture.write("blocked.md", "# A\nalpha\n");
        fs::create_dir_all(&job.target_path).unwrap();
        let mut orch = orchestrator(UppercaseTranslator, options());

        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Failed(DocError::Io { .. })));
        assert!(orch.cache().entry(&job.cache_key).is_none());
        assert!(!orch.cache().is_dirty());
    }

    #[tokio::test]
    async fn first_failed_chunk_stops_the_file() {
        let fixture = Fixture::new();
        let job = fixture.write(
            "stop.md",
            "# Alpha\nFAIL in the first section\n\n# Beta\nsecond section body text\n\n# Gamma\nthird section body text\n",
        );
        let translator = FailingTranslator::on("FAIL");
        let calls = translator.call_count();
        let mut orch = orchestrator(
            translator,
            OrchestratorOptions {
                max_tokens_per_chunk: 4,
                concurrency: 1,
                ..options()
            },
        );

        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Failed(DocError::Translate { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_source_language_retranslates_every_section() {
        let fixture = Fixture::new();
        let job = fixture.write("pair.md", "# A\nalpha\n\n# B\nbeta\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, OrchestratorOptions { max_tokens_per_chunk: 4, ..options() });
        assert!(matches!(orch.translate_file(&job).await, FileOutcome::Translated { calls: 2, .. }));

        let from_ja = FileJob::new(&fixture.source_root, &fixture.target_root, Path::new("pair.md"), "ja", "en");
        assert_eq!(from_ja.cache_key, job.cache_key);
        let outcome = orch.translate_file(&from_ja).await;
        assert!(matches!(outcome, FileOutcome::Translated { sections: 2, calls: 2 }));
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn code_and_imports_never_reach_the_translator() {
        let fixture = Fixture::new();
        let job = fixture.write(
            "code.mdx",
            "import Tabs from '@theme/Tabs';\n\n```bash\nnpm i\n```\n",
        );
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, options());
        let outcome = orch.translate_file(&job).await;
        assert!(matches!(outcome, FileOutcome::Translated { sections: 0, calls: 0 }));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(
            fixture.output("code.mdx"),
            "import Tabs from '@theme/Tabs';\n\n```bash\nnpm i\n```\n"
        );
    }

    #[tokio::test]
    async fn dry_run_plans_without_side_effects() {
        let fixture = Fixture::new();
        let job = fixture.write("d.md", "# A\nalpha\n\n```\ncode\n```\n\n# B\nbeta\n");
        let translator = RecordingTranslator::default();
        let calls = translator.calls();
        let mut orch = orchestrator(translator, OrchestratorOptions { dry_run: true, ..options() });

        let report = orch.run_language("en", &[job.clone()]).await;
        assert_eq!(report.planned, 1);
        assert_eq!(report.to_string(), "[en] translated: 0, skipped: 0, failed: 0, planned: 1");
        assert!(calls.lock().unwrap().is_empty());
        assert!(!job.target_path.exists());
        assert!(orch.cache().is_empty());
        assert!(!orch.cache().is_dirty());
    }

    #[tokio::test]
    async fn glossary_terms_are_filtered_per_chunk() {
        let fixture = Fixture::new();
        let job = fixture.write("g.md", "# 组件\n使用组件\n");
        let translator = RecordingTranslator::default();
        let contexts = translator.contexts();
        let mut orch = orchestrator(translator, options());
        orch.glossary_mut().upsert(crate::glossary::GlossaryEntry::new("组件").with_translation("en", "component"));
        orch.glossary_mut().upsert(crate::glossary::GlossaryEntry::new("路由").with_translation("en", "route"));
        orch.translate_file(&job).await;

        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].glossary.len(), 1);
        assert_eq!(contexts[0].glossary.get("组件"), Some(&"component".to_string()));
        assert_eq!(contexts[0].document_title.as_deref(), Some("组件"));
        assert_eq!(contexts[0].outline, vec!["# 组件"]);
    }

    #[tokio::test]
    async fn parallel_chunks_merge_by_section_id() {
        let fixture = Fixture::new();
        let raw: String = (0..8).map(|n| format!("# H{n}\nbody {n}\n\n")).collect();
        let job = fixture.write("p.md", &raw);
        let mut orch = orchestrator(
            UppercaseTranslator,
            OrchestratorOptions { max_tokens_per_chunk: 4, concurrency: 4, ..options() },
        );
        orch.translate_file(&job).await;
        let expected: Vec<String> = (0..8).map(|n| format!("# H{n}\nBODY {n}")).collect();
        assert_eq!(fixture.output("p.md"), format!("{}\n", expected.join("\n\n")));
    }

    #[tokio::test]
    async fn pacer_spaces_out_calls() {
        let pacer = RequestPacer::new(Duration::from_millis(30));
        let started = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn shutdown_persists_cache() {
        let fixture = Fixture::new();
        let job = fixture.write("s.md", "# A\nalpha\n");
        let cache_path = fixture.source_root.join("../cache.json");
        let cache = CacheStore::load(&cache_path);
        let mut orch = TranslationOrchestrator::new(UppercaseTranslator, cache, GlossaryStore::empty(), options());
        orch.translate_file(&job).await;
        orch.shutdown().unwrap();
        assert_eq!(CacheStore::load(&cache_path).len(), 1);

        orch.clear_cache().unwrap();
        assert!(CacheStore::load(&cache_path).is_empty());
    }
}
