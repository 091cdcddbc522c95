use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Sampling parameters sent as `generationConfig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Everything the generation client needs to reach the provider. Built by
/// the caller and handed to the client; the client reads nothing else.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
    pub generation: GenerationSettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            generation: GenerationSettings::default(),
        }
    }
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let trimmed = api_base.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        let trimmed = model.trim();
        if !trimmed.is_empty() {
            self.model = trimmed.to_string();
        }
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("provider API key is empty (set GEMINI_API_KEY or pass --api-key)");
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            bail!("provider API base must be an http(s) URL: {}", self.api_base);
        }
        if self.request_timeout < Duration::from_secs(1) || self.request_timeout > MAX_REQUEST_TIMEOUT
        {
            bail!(
                "request timeout must be between 1 and {} seconds",
                MAX_REQUEST_TIMEOUT.as_secs()
            );
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("ProviderConfig")
            .field("api_key", &key)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("generation", &self.generation)
            .finish()
    }
}
