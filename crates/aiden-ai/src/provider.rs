use crate::frames::{self, FrameOutcome};
use crate::AiError;
use aiden_config::AiConfig;
use aiden_proto::{AiProvider, ChatParams};
use serde_json::{json, Value};

pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// HTTP client for the supported AI providers.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    anthropic_base_url: String,
    openai_base_url: String,
}

impl ProviderClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            anthropic_base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            openai_base_url: config.openai_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// One-shot completion; returns the first text block.
    pub async fn chat(
        &self,
        provider: AiProvider,
        api_key: &str,
        params: &ChatParams,
    ) -> Result<String, AiError> {
        let response = self.send(provider, api_key, params, false).await?;
        let body: Value = response.json().await?;
        let text = match provider {
            AiProvider::Anthropic => body["content"][0]["text"].as_str(),
            AiProvider::Openai => body["choices"][0]["message"]["content"].as_str(),
        };
        text.map(str::to_string)
            .ok_or_else(|| AiError::Protocol(format!("no text in {provider} response")))
    }

    /// Open a streaming completion. Non-2xx responses become `AiError::Http`.
    pub async fn open_stream(
        &self,
        provider: AiProvider,
        api_key: &str,
        params: &ChatParams,
    ) -> Result<reqwest::Response, AiError> {
        self.send(provider, api_key, params, true).await
    }

    pub fn decode_frame(provider: AiProvider, payload: &str) -> FrameOutcome {
        match provider {
            AiProvider::Anthropic => frames::anthropic(payload),
            AiProvider::Openai => frames::openai(payload),
        }
    }

    async fn send(
        &self,
        provider: AiProvider,
        api_key: &str,
        params: &ChatParams,
        stream: bool,
    ) -> Result<reqwest::Response, AiError> {
        let request = match provider {
            AiProvider::Anthropic => self
                .http
                .post(format!("{}/v1/messages", self.anthropic_base_url))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&anthropic_body(params, stream)),
            AiProvider::Openai => self
                .http
                .post(format!("{}/v1/chat/completions", self.openai_base_url))
                .bearer_auth(api_key)
                .json(&openai_body(params, stream)),
        };

        tracing::debug!(%provider, stream, "sending provider request");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn anthropic_body(params: &ChatParams, stream: bool) -> Value {
    let mut body = json!({
        "model": params.model.as_deref().unwrap_or(ANTHROPIC_DEFAULT_MODEL),
        "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": params.messages,
        "stream": stream,
    });
    if let Some(system) = params.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body["system"] = json!(system);
    }
    body
}

fn openai_body(params: &ChatParams, stream: bool) -> Value {
    let mut messages = Vec::with_capacity(params.messages.len() + 1);
    if let Some(system) = params.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.extend(params.messages.iter().map(|m| json!(m)));
    json!({
        "model": params.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL),
        "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages,
        "stream": stream,
    })
}
