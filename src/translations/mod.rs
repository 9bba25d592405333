use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::providers::ToolSpec;
use crate::translator::TranslateContext;

pub const TOOL_NAME: &str = "deliver_translation";

const SYSTEM_PROMPT: &str = include_str!("prompts/system_prompt.tera");

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the translated document text.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "translation": {
                    "type": "string",
                    "description": "The full translated text, with all markup preserved."
                }
            },
            "required": ["translation"]
        }),
    }
}

pub fn render_system_prompt(
    source_lang: &str,
    target_lang: &str,
    context: &TranslateContext,
    tool_name: &str,
) -> Result<String> {
    let mut tera_context = TeraContext::new();
    tera_context.insert("source_lang", source_lang);
    tera_context.insert("target_lang", target_lang);
    tera_context.insert("document_title", &context.document_title);
    tera_context.insert("document_type", &context.document_type);
    tera_context.insert("outline", &context.outline);
    tera_context.insert("glossary", &context.glossary);
    tera_context.insert("tool_name", tool_name);

    Tera::one_off(SYSTEM_PROMPT, &tera_context, false)
        .with_context(|| "failed to render system prompt")
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    translation: String,
}

/// Validates the tool arguments and returns the cleaned translation.
pub fn parse_tool_args(value: Value, source: &str) -> Result<String> {
    let args: ToolArgs =
        serde_json::from_value(value).with_context(|| "malformed translation tool arguments")?;
    if args.translation.trim().is_empty() && !source.trim().is_empty() {
        return Err(anyhow!("translation is empty"));
    }
    Ok(clean_translation(source, &args.translation))
}

/// Removes one code fence wrapped around the whole answer when the source was
/// not itself a single fenced block.
pub fn clean_translation(source: &str, translated: &str) -> String {
    let trimmed = translated.trim();
    if source.trim_start().starts_with("```") {
        return trimmed.to_string();
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed.to_string();
    };
    let (opening, rest) = trimmed.split_at(first_newline);
    if !opening.starts_with("```") || !rest.ends_with("```") {
        return trimmed.to_string();
    }
    let inner = &rest[..rest.len() - 3];
    if inner.lines().any(|line| line.trim_start().starts_with("```")) {
        return trimmed.to_string();
    }
    inner.trim().to_string()
}
