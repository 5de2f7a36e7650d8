use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub zendesk: ZendeskConfig,
    #[serde(default)]
    pub flows: FlowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Group chat the bot is expected to serve; only checked at startup.
    #[serde(default)]
    pub home_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            command_prefix: default_command_prefix(),
            home_chat_id: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZendeskConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ZendeskConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            api_token: String::new(),
            subdomain: String::new(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ZendeskConfig {
    /// Returns the API root: the explicit `base_url` if set, otherwise the
    /// tenant URL built from the subdomain.
    pub fn effective_base_url(&self) -> String {
        match self.base_url.as_deref() {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("https://{}.zendesk.com", self.subdomain),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlowConfig {
    /// Ask for a contact email before creating a ticket.
    #[serde(default = "default_true")]
    pub collect_email: bool,
    /// Only let the user who opened a ticket post updates to it.
    #[serde(default = "default_true")]
    pub check_ownership: bool,
    /// 0 waits forever.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            collect_email: true,
            check_ownership: true,
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl FlowConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        match self.reply_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily log files. Console only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_command_prefix() -> String {
    "/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_reply_timeout_secs() -> u64 {
    900
}

fn default_file_prefix() -> String {
    "deskbot".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the TOML file at `path` (if it exists), then apply environment
    /// overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = get("DESKBOT_HOME_CHAT_ID") {
            let id = chat_id
                .parse()
                .with_context(|| format!("DESKBOT_HOME_CHAT_ID is not a chat id: {chat_id}"))?;
            self.telegram.home_chat_id = Some(id);
        }
        if let Some(email) = get("ZD_EMAIL") {
            self.zendesk.email = email;
        }
        if let Some(token) = get("ZD_TOKEN") {
            self.zendesk.api_token = token;
        }
        if let Some(subdomain) = get("ZD_DOMAIN") {
            self.zendesk.subdomain = subdomain;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            bail!("Telegram bot token is missing (telegram.bot_token or TELEGRAM_BOT_TOKEN)");
        }
        if self.telegram.command_prefix.chars().any(char::is_whitespace) {
            bail!("telegram.command_prefix must not contain whitespace");
        }
        if self.zendesk.email.is_empty() || self.zendesk.api_token.is_empty() {
            bail!("Zendesk credentials are missing (zendesk.email/api_token or ZD_EMAIL/ZD_TOKEN)");
        }
        let has_base_url = self
            .zendesk
            .base_url
            .as_deref()
            .is_some_and(|url| !url.is_empty());
        if self.zendesk.subdomain.is_empty() && !has_base_url {
            bail!("Zendesk subdomain is missing (zendesk.subdomain or ZD_DOMAIN)");
        }
        Ok(())
    }
}
