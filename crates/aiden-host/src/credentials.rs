use aiden_ai::{CredentialSource, StaticCredentials};
use aiden_proto::AiProvider;
use aiden_store::Store;
use serde_json::Value;
use std::sync::Arc;

/// Reads provider choice and API keys from a user's settings document
/// (`selectedAiProvider`, `claudeApiKey`, `openaiApiKey`), falling back to
/// the environment when a key is not set there.
pub struct SettingsCredentials {
    store: Arc<Store>,
    user_id: String,
    fallback: StaticCredentials,
}

impl SettingsCredentials {
    pub fn new(store: Arc<Store>, user_id: impl Into<String>, fallback: StaticCredentials) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            fallback,
        }
    }

    fn setting(&self, key: &str) -> Option<String> {
        let settings = match self.store.settings(&self.user_id) {
            Ok(settings) => settings?,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to read user settings");
                return None;
            }
        };
        settings
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

fn parse_provider(value: &str) -> Option<AiProvider> {
    match value.to_ascii_lowercase().as_str() {
        "anthropic" | "claude" => Some(AiProvider::Anthropic),
        "openai" => Some(AiProvider::Openai),
        _ => None,
    }
}

impl CredentialSource for SettingsCredentials {
    fn preferred_provider(&self) -> Option<AiProvider> {
        self.setting("selectedAiProvider")
            .and_then(|v| parse_provider(&v))
            .or_else(|| self.fallback.preferred_provider())
    }

    fn api_key(&self, provider: AiProvider) -> Option<String> {
        let key = match provider {
            AiProvider::Anthropic => "claudeApiKey",
            AiProvider::Openai => "openaiApiKey",
        };
        self.setting(key).or_else(|| self.fallback.api_key(provider))
    }
}
