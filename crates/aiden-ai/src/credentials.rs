use aiden_proto::AiProvider;

/// Where provider selection and API keys come from.
pub trait CredentialSource: Send + Sync {
    /// Provider used when a request does not name one.
    fn preferred_provider(&self) -> Option<AiProvider>;
    fn api_key(&self, provider: AiProvider) -> Option<String>;
}

/// Fixed keys, e.g. from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub provider: Option<AiProvider>,
    pub anthropic_key: Option<String>,
    pub openai_key: Option<String>,
}

impl StaticCredentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            provider: None,
            anthropic_key: read("ANTHROPIC_API_KEY"),
            openai_key: read("OPENAI_API_KEY"),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn preferred_provider(&self) -> Option<AiProvider> {
        self.provider
    }

    fn api_key(&self, provider: AiProvider) -> Option<String> {
        match provider {
            AiProvider::Anthropic => self.anthropic_key.clone(),
            AiProvider::Openai => self.openai_key.clone(),
        }
    }
}
