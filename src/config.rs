use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dispatcher::ContextPolicy;
use crate::error::{OncoError, Result};
use crate::prompt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sessions untouched for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8501
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Azure,
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    /// Model name; for Azure this is the deployment name.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Azure resource endpoint or OpenAI-compatible base URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            api_version: default_api_version(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_api_version() -> String {
    "2024-08-01-preview".into()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub context_policy: ContextPolicy,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_sample_questions")]
    pub sample_questions: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            context_policy: ContextPolicy::default(),
            max_steps: default_max_steps(),
            sample_questions: default_sample_questions(),
        }
    }
}

fn default_system_prompt() -> String {
    prompt::DEFAULT_SYSTEM_PROMPT.into()
}

fn default_max_steps() -> usize {
    8
}

fn default_sample_questions() -> Vec<String> {
    prompt::SAMPLE_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandingConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_tagline")]
    pub tagline: String,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
    #[serde(default = "default_input_placeholder")]
    pub input_placeholder: String,
    #[serde(default = "default_footer")]
    pub footer: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            tagline: default_tagline(),
            disclaimer: default_disclaimer(),
            input_placeholder: default_input_placeholder(),
            footer: default_footer(),
        }
    }
}

fn default_app_name() -> String {
    prompt::APP_NAME.into()
}

fn default_tagline() -> String {
    prompt::TAGLINE.into()
}

fn default_disclaimer() -> String {
    prompt::DISCLAIMER.into()
}

fn default_input_placeholder() -> String {
    prompt::INPUT_PLACEHOLDER.into()
}

fn default_footer() -> String {
    prompt::FOOTER.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PubmedConfig {
    #[serde(default = "default_pubmed_results")]
    pub max_results: usize,
    #[serde(default = "default_pubmed_base_url")]
    pub base_url: String,
}

impl Default for PubmedConfig {
    fn default() -> Self {
        Self {
            max_results: default_pubmed_results(),
            base_url: default_pubmed_base_url(),
        }
    }
}

fn default_pubmed_results() -> usize {
    3
}

fn default_pubmed_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
    /// Also append log lines to this file.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            file: None,
        }
    }
}

fn default_log_filter() -> String {
    "oncoally=info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub branding: BrandingConfig,
    #[serde(default)]
    pub pubmed: PubmedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| OncoError::Config(format!("Failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Defaults overlaid with environment variables, for running without a file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("ONCOALLY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("ONCOALLY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|err| OncoError::Config(format!("invalid ONCOALLY_PORT `{port}`: {err}")))?;
        }
        if let Ok(endpoint) = env::var("AZURE_OPENAI_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if let Ok(key) = env::var("AZURE_OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(model) = env::var("AZURE_OPENAI_MODEL_NAME") {
            self.model.model = model;
        }
        if let Ok(version) = env::var("AZURE_OPENAI_API_VERSION") {
            self.model.api_version = version;
        }
        if let Ok(policy) = env::var("ONCOALLY_CONTEXT_POLICY") {
            self.assistant.context_policy = policy.parse()?;
        }
        if let Ok(file) = env::var("ONCOALLY_LOG_FILE") {
            self.logging.file = Some(file);
        }
        Ok(())
    }
}
