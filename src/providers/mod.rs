use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod openai;
pub(crate) mod retry;

pub use openai::{DEFAULT_MODEL, OpenAI};

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// A chat model that answers by calling one registered tool.
pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

/// Accepts `gpt-4o`, `openai:gpt-4o` or a bare `openai`.
pub fn parse_model_arg(model_arg: &str) -> Result<Option<String>> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }
    if raw.eq_ignore_ascii_case("openai") {
        return Ok(None);
    }
    let model = match raw.split_once(':') {
        Some((provider, model)) if provider.trim().eq_ignore_ascii_case("openai") => model.trim(),
        Some((provider, _)) => {
            return Err(anyhow!(
                "unsupported provider '{}' (only openai-compatible endpoints are supported)",
                provider.trim()
            ));
        }
        None => raw,
    };
    if model.is_empty() {
        Ok(None)
    } else {
        Ok(Some(model.to_string()))
    }
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("OPENAI_API_KEY").ok_or_else(|| anyhow!("API key not found (set OPENAI_API_KEY or pass --key)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
