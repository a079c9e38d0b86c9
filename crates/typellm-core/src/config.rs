use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration trait for the completion provider
pub trait ProviderConfig: Send + Sync {
    /// Get the API key for this provider
    fn api_key(&self) -> &str;

    /// Get the base URL for API requests
    fn base_url(&self) -> &str;

    /// Get default request timeout
    fn timeout(&self) -> Duration;

    /// Get any additional headers required by the provider
    fn headers(&self) -> HashMap<String, String>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), LlmError>;
}

/// OpenAI configuration; any OpenAI-compatible endpoint works through `base_url`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    60
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            organization: None,
            project: None,
            base_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

impl ProviderConfig for OpenAIConfig {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }

        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }

        headers
    }

    fn validate(&self) -> Result<(), LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::configuration("API key is required"));
        }

        let base_url = self.base_url();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(LlmError::configuration(
                "Base URL must be a valid HTTP/HTTPS URL",
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(LlmError::configuration("Timeout must be at least one second"));
        }

        Ok(())
    }
}

/// Configuration builder for creating provider configs from environment variables
pub struct ConfigBuilder;

impl ConfigBuilder {
    /// Create OpenAI config from environment
    pub fn openai_from_env() -> Result<OpenAIConfig, LlmError> {
        Self::openai_from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ConfigBuilder::openai_from_env`] with a custom variable source
    pub fn openai_from_lookup<F>(lookup: F) -> Result<OpenAIConfig, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY").ok_or_else(|| {
            LlmError::configuration("OPENAI_API_KEY environment variable not set")
        })?;

        let mut config = OpenAIConfig::new(api_key);

        if let Some(org) = lookup("OPENAI_ORGANIZATION") {
            config = config.with_organization(org);
        }

        if let Some(project) = lookup("OPENAI_PROJECT") {
            config = config.with_project(project);
        }

        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config = config.with_base_url(base_url);
        }

        config.validate()?;
        Ok(config)
    }
}
