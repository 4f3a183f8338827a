//! Service configuration, loaded once at startup and shared read-only.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, ReviewError};

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPEN_ROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_AI_MODEL: &str = "gpt-4o";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_MAX_RECENT_EVENTS: usize = 200;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReviewConfig {
    pub server: ServerConfig,
    pub github: GithubConfig,
    pub ai: AiConfig,
    pub teams: TeamsConfig,
    pub email: EmailConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GithubConfig {
    pub token: String,
    pub webhook_secret: String,
    pub api_base_url: String,
    /// Review every commit of a push event.
    pub push_review_enabled: bool,
    /// Submit a formal review back to pull requests.
    pub pr_review_enabled: bool,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            webhook_secret: String::new(),
            api_base_url: DEFAULT_GITHUB_API.to_string(),
            push_review_enabled: true,
            pr_review_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub openai_api_key: Option<String>,
    pub open_router_api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            open_router_api_key: None,
            model: DEFAULT_AI_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl AiConfig {
    /// Returns the API key and base URL to use. OpenRouter takes precedence when configured.
    pub fn endpoint(&self) -> Option<(String, String)> {
        if let Some(key) = non_empty(&self.open_router_api_key) {
            let base = self
                .base_url
                .clone()
                .unwrap_or_else(|| OPEN_ROUTER_API_BASE.to_string());
            return Some((key.to_string(), base));
        }
        non_empty(&self.openai_api_key).map(|key| {
            let base = self
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_BASE.to_string());
            (key.to_string(), base)
        })
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TeamsConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: Option<String>,
    /// Implicit TLS (SMTPS). When false the connection is upgraded with STARTTLS.
    pub secure: bool,
    /// Fallback recipient when no explicit recipient is given.
    pub to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            port: DEFAULT_SMTP_PORT,
            user: None,
            pass: None,
            from: None,
            secure: false,
            to: None,
        }
    }
}

impl EmailConfig {
    /// Returns the sender address, defaulting to the SMTP user.
    pub fn sender(&self) -> Option<&str> {
        non_empty(&self.from).or_else(|| non_empty(&self.user))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub max_recent_events: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_recent_events: DEFAULT_MAX_RECENT_EVENTS,
        }
    }
}

impl ReviewConfig {
    /// Load and parse the configuration file, then apply environment overrides.
    /// A missing file is not an error; everything can come from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let config_str = fs::read_to_string(path).map_err(|e| {
                ReviewError::ConfigError(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str(&config_str)?
        } else {
            ReviewConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides secrets from the environment. `lookup` is injected so tests
    /// never touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Some(secret) = get("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = secret;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.ai.openai_api_key = Some(key);
        }
        if let Some(key) = get("OPEN_ROUTER_API_KEY") {
            self.ai.open_router_api_key = Some(key);
        }
        if let Some(pass) = get("EMAIL_PASS") {
            self.email.pass = Some(pass);
        }
        if let Some(url) = get("TEAMS_WEBHOOK_URL") {
            self.teams.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.token.is_empty() {
            return Err(ReviewError::ConfigError("GitHub token is required".into()));
        }
        if self.github.webhook_secret.is_empty() {
            return Err(ReviewError::ConfigError(
                "GitHub webhook secret is required".into(),
            ));
        }
        if self.ai.endpoint().is_none() {
            return Err(ReviewError::ConfigError(
                "Either an OpenRouter or an OpenAI API key must be set".into(),
            ));
        }
        if self.email.enabled
            && (non_empty(&self.email.host).is_none()
                || non_empty(&self.email.user).is_none()
                || non_empty(&self.email.pass).is_none())
        {
            return Err(ReviewError::ConfigError(
                "Email host, user and pass are required when email is enabled".into(),
            ));
        }
        if self.teams.enabled && non_empty(&self.teams.webhook_url).is_none() {
            return Err(ReviewError::ConfigError(
                "Teams webhook URL is required when teams is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
