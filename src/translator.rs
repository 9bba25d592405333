use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use crate::providers::Provider;
use crate::translations::{self, TOOL_NAME, tool_spec};

/// Document-level hints passed along with every chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslateContext {
    pub document_title: Option<String>,
    /// File extension of the source document (`md`, `mdx`).
    pub document_type: String,
    /// Source term to required target term.
    pub glossary: BTreeMap<String, String>,
    pub outline: Vec<String>,
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Translates markup-bearing text, leaving all syntax intact.
pub trait DocumentTranslator: Send + Sync {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
        context: &'a TranslateContext,
    ) -> TranslateFuture<'a>;
}

/// Translator backed by a tool-calling chat model.
#[derive(Debug, Clone)]
pub struct LlmTranslator<P: Provider> {
    provider: P,
}

impl<P: Provider> LlmTranslator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    async fn exec(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        context: &TranslateContext,
    ) -> Result<String> {
        let system_prompt =
            translations::render_system_prompt(source_lang, target_lang, context, TOOL_NAME)?;
        let response = self
            .provider
            .clone()
            .register_tool(tool_spec(TOOL_NAME))
            .append_system_input(system_prompt)
            .append_user_input(text.to_string())
            .call_tool(TOOL_NAME)
            .await?;
        if let Some(usage) = &response.usage {
            debug!(
                "model {} used {} tokens",
                response.model.as_deref().unwrap_or("unknown"),
                usage.total_tokens.unwrap_or_default()
            );
        }
        translations::parse_tool_args(response.args, text)
    }
}

impl<P: Provider + 'static> DocumentTranslator for LlmTranslator<P> {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
        context: &'a TranslateContext,
    ) -> TranslateFuture<'a> {
        Box::pin(self.exec(text, source_lang, target_lang, context))
    }
}
