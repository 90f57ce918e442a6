//! HTTP-backed analysis provider.

use anyhow::Result;
use diffsentry_core::config::AiModelConfig;
use diffsentry_core::{AnalysisError, AnalysisProvider, AnalysisRequest};
use reqwest::blocking::Client;

mod client;

/// Calls the configured LLM provider over HTTPS. One instance is shared by
/// the whole worker pool; per-request timeouts come from the request itself.
pub struct HttpProvider {
    client: Client,
    provider: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(config: &AiModelConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.provider).ok_or_else(|| {
            anyhow::anyhow!(
                "No API key found. Set the {} environment variable.",
                key_env_var(&config.provider)
            )
        })?;
        let client = Client::builder()
            .user_agent(format!("diffsentry/{}", diffsentry_core::VERSION))
            .build()?;
        Ok(Self {
            client,
            provider: config.provider.clone(),
            api_key,
        })
    }
}

impl AnalysisProvider for HttpProvider {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        match self.provider.as_str() {
            "openai" => client::call_openai(&self.client, &self.api_key, request),
            _ => client::call_anthropic(&self.client, &self.api_key, request),
        }
    }
}

fn key_env_var(provider: &str) -> &'static str {
    match provider {
        "openai" => "OPENAI_API_KEY",
        _ => "ANTHROPIC_API_KEY",
    }
}

fn resolve_api_key(provider: &str) -> Option<String> {
    std::env::var(key_env_var(provider))
        .ok()
        .filter(|k| !k.is_empty())
}
