//! Stub translators for unit tests.

use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::translator::{DocumentTranslator, TranslateContext, TranslateFuture};

/// Upper-cases everything, markers included.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UppercaseTranslator;

impl DocumentTranslator for UppercaseTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _source_lang: &'a str,
        _target_lang: &'a str,
        _context: &'a TranslateContext,
    ) -> TranslateFuture<'a> {
        Box::pin(async move { Ok(text.to_uppercase()) })
    }
}

/// Records every input and context, and prefixes `[<target>] ` to the first
/// line of each section.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingTranslator {
    calls: Arc<Mutex<Vec<String>>>,
    contexts: Arc<Mutex<Vec<TranslateContext>>>,
}

impl RecordingTranslator {
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    pub(crate) fn contexts(&self) -> Arc<Mutex<Vec<TranslateContext>>> {
        self.contexts.clone()
    }
}

fn tag_sections(text: &str, target_lang: &str) -> String {
    let mut out = Vec::new();
    let mut tag_next = true;
    for line in text.lines() {
        if line.trim_start().starts_with("<!--") {
            tag_next = true;
            out.push(line.to_string());
        } else if tag_next && !line.trim().is_empty() {
            tag_next = false;
            out.push(format!("[{}] {}", target_lang, line));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

impl DocumentTranslator for RecordingTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _source_lang: &'a str,
        target_lang: &'a str,
        context: &'a TranslateContext,
    ) -> TranslateFuture<'a> {
        self.calls.lock().unwrap().push(text.to_string());
        self.contexts.lock().unwrap().push(context.clone());
        Box::pin(async move { Ok(tag_sections(text, target_lang)) })
    }
}

/// Fails on any input containing `needle`, upper-cases the rest.
#[derive(Debug, Clone)]
pub(crate) struct FailingTranslator {
    needle: String,
    calls: Arc<AtomicUsize>,
}

impl FailingTranslator {
    pub(crate) fn on(needle: &str) -> Self {
        Self {
            needle: needle.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl DocumentTranslator for FailingTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _source_lang: &'a str,
        _target_lang: &'a str,
        _context: &'a TranslateContext,
    ) -> TranslateFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if text.contains(&self.needle) {
                return Err(anyhow!("provider rejected the request"));
            }
            Ok(text.to_uppercase())
        })
    }
}

/// Fails the first `failures` calls, then upper-cases.
#[derive(Debug, Default)]
pub(crate) struct FlakyTranslator {
    failures: usize,
    seen: AtomicUsize,
}

impl FlakyTranslator {
    pub(crate) fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            seen: AtomicUsize::new(0),
        }
    }
}

impl DocumentTranslator for FlakyTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _source_lang: &'a str,
        _target_lang: &'a str,
        _context: &'a TranslateContext,
    ) -> TranslateFuture<'a> {
        let attempt = self.seen.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if attempt < self.failures {
                return Err(anyhow!("503 service unavailable"));
            }
            Ok(text.to_uppercase())
        })
    }
}
