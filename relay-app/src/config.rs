//! tgrelay configuration loader.
//!
//! TOML on disk, environment variables on top. Every section is optional so a
//! bare `TELEGRAM_BOT_TOKEN` plus a model key is enough to run.

use crate::dispatch::{
    DEFAULT_BACKOFF, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RESET_REPLY, DEFAULT_UNSUPPORTED_NOTICE,
    DispatchSettings,
};
use crate::router::{DEFAULT_RESET_COMMAND, DEFAULT_SESSION_NAMESPACE};
use relay_channels::TELEGRAM_DEFAULT_API_BASE;
use relay_llm::Provider;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Absent or blank means the dispatch loop is not started.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Whole-request timeout. Defaults to the poll timeout plus a margin.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_api_base_url() -> String {
    TELEGRAM_DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: default_api_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: None,
        }
    }
}

impl TelegramConfig {
    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(self.poll_timeout_secs.saturating_add(15)),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_session_namespace")]
    pub session_namespace: String,
    #[serde(default = "default_reset_command")]
    pub reset_command: String,
    #[serde(default = "default_reset_reply")]
    pub reset_reply: String,
    #[serde(default = "default_unsupported_notice")]
    pub unsupported_notice: String,
}

fn default_backoff_secs() -> u64 {
    DEFAULT_BACKOFF.as_secs()
}

fn default_session_namespace() -> String {
    DEFAULT_SESSION_NAMESPACE.to_string()
}

fn default_reset_command() -> String {
    DEFAULT_RESET_COMMAND.to_string()
}

fn default_reset_reply() -> String {
    DEFAULT_RESET_REPLY.to_string()
}

fn default_unsupported_notice() -> String {
    DEFAULT_UNSUPPORTED_NOTICE.to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
            session_namespace: default_session_namespace(),
            reset_command: default_reset_command(),
            reset_reply: default_reset_reply(),
            unsupported_notice: default_unsupported_notice(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// OpenAI-compatible or Anthropic-compatible endpoint override.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant replying in a Telegram chat. Keep answers short.".to_string()
}

fn default_max_history_messages() -> usize {
    40
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            api_base_url: None,
            system_prompt: default_system_prompt(),
            max_history_messages: default_max_history_messages(),
        }
    }
}

impl ProcessorConfig {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CursorConfig {
    #[serde(default = "default_cursor_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

fn default_cursor_enabled() -> bool {
    true
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            enabled: default_cursor_enabled(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub prompt_path: Option<String>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub chat_id: Option<i64>,
}

fn default_heartbeat_interval_secs() -> u64 {
    1800
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prompt_path: None,
            interval_secs: default_heartbeat_interval_secs(),
            chat_id: None,
        }
    }
}

impl RelayConfig {
    /// Load from `path`, or from the default location when `None`. Only an
    /// explicitly requested file must exist.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let explicit = path.is_some();
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                RelayConfig::default()
            }
            Err(err) => {
                return Err(anyhow::anyhow!("read config {}: {err}", path.display()));
            }
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = non_empty("TELEGRAM_API_BASE") {
            self.telegram.api_base_url = v;
        }
        if let Some(v) = non_empty("TGRELAY_MODEL") {
            self.processor.model = v;
        }
        if self.processor.api_key().is_none() {
            let key_var = match Provider::for_model(&self.processor.model) {
                Provider::Anthropic => "ANTHROPIC_API_KEY",
                Provider::OpenAI => "OPENAI_API_KEY",
            };
            if let Some(v) = non_empty(key_var) {
                self.processor.api_key = Some(v);
            }
        }
        if let Some(v) = non_empty("TGRELAY_HEARTBEAT_CHAT_ID") {
            match v.trim().parse::<i64>() {
                Ok(chat_id) => self.heartbeat.chat_id = Some(chat_id),
                Err(e) => tracing::warn!(%e, "ignoring invalid TGRELAY_HEARTBEAT_CHAT_ID"),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.poll_timeout_secs == 0 {
            return Err(anyhow::anyhow!("telegram.poll_timeout_secs must be > 0"));
        }
        if self.telegram.request_timeout().as_secs() <= self.telegram.poll_timeout_secs {
            return Err(anyhow::anyhow!(
                "telegram.request_timeout_secs must exceed telegram.poll_timeout_secs"
            ));
        }
        if self.dispatch.backoff_secs == 0 {
            return Err(anyhow::anyhow!("dispatch.backoff_secs must be > 0"));
        }
        if self.dispatch.reset_command.trim().is_empty()
            || self.dispatch.reset_command.contains(char::is_whitespace)
        {
            return Err(anyhow::anyhow!(
                "dispatch.reset_command must be a single non-empty token"
            ));
        }
        if self.dispatch.session_namespace.is_empty()
            || self.dispatch.session_namespace.contains(char::is_whitespace)
        {
            return Err(anyhow::anyhow!(
                "dispatch.session_namespace must be non-empty without whitespace"
            ));
        }
        if self.processor.model.trim().is_empty() {
            return Err(anyhow::anyhow!("processor.model is required"));
        }
        if self.processor.max_history_messages == 0 {
            return Err(anyhow::anyhow!("processor.max_history_messages must be > 0"));
        }
        if self.heartbeat.enabled {
            if self.heartbeat.chat_id.is_none() {
                return Err(anyhow::anyhow!("heartbeat.chat_id is required when enabled"));
            }
            if self.heartbeat.interval_secs == 0 {
                return Err(anyhow::anyhow!("heartbeat.interval_secs must be > 0"));
            }
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            poll_timeout_secs: self.telegram.poll_timeout_secs,
            backoff: Duration::from_secs(self.dispatch.backoff_secs),
            reset_reply: self.dispatch.reset_reply.clone(),
            unsupported_notice: self.dispatch.unsupported_notice.clone(),
        }
    }

    pub fn cursor_path(&self) -> anyhow::Result<PathBuf> {
        match self.cursor.path.as_deref() {
            Some(path) => expand_home(path),
            None => Ok(default_data_dir()?.join("offset")),
        }
    }

    pub fn heartbeat_prompt_path(&self) -> anyhow::Result<PathBuf> {
        match self.heartbeat.prompt_path.as_deref() {
            Some(path) => expand_home(path),
            None => Ok(config_root()?.join("HEARTBEAT.md")),
        }
    }
}

fn home_dir() -> anyhow::Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| anyhow::anyhow!("HOME is not set"))
}

pub fn config_root() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join(".tgrelay"))
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_root()?.join("config.toml"))
}

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    Ok(config_root()?.join("data"))
}

pub fn expand_home(path: &str) -> anyhow::Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    if path == "~" {
        return home_dir();
    }
    Ok(Path::new(path).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::RelayConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_documented_defaults() {
        let cfg = RelayConfig::parse("").expect("parse");
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.telegram.bot_token(), None);
        assert_eq!(cfg.telegram.poll_timeout_secs, 30);
        assert_eq!(cfg.telegram.request_timeout(), Duration::from_secs(45));
        assert_eq!(cfg.dispatch.backoff_secs, 5);
        assert_eq!(cfg.dispatch.session_namespace, "tg");
        assert_eq!(cfg.dispatch.reset_command, "/new");
        assert!(cfg.cursor.enabled);
        assert!(!cfg.heartbeat.enabled);

        let settings = cfg.dispatch_settings();
        assert_eq!(settings.backoff, Duration::from_secs(5));
        assert_eq!(settings.poll_timeout_secs, 30);
    }

    #[test]
    fn section_values_override_defaults() {
        let cfg = RelayConfig::parse(
            r#"
[telegram]
bot_token = "123:abc"
poll_timeout_secs = 50

[dispatch]
backoff_secs = 2
reset_reply = "ok, fresh"

[heartbeat]
enabled = true
chat_id = -100
interval_secs = 60
"#,
        )
        .expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.telegram.bot_token(), Some("123:abc"));
        assert_eq!(cfg.telegram.request_timeout(), Duration::from_secs(65));
        assert_eq!(cfg.dispatch_settings().reset_reply, "ok, fresh");
        assert_eq!(cfg.heartbeat.chat_id, Some(-100));
    }

    #[test]
    fn env_overrides_fill_token_model_and_matching_key() {
        let mut cfg = RelayConfig::default();
        cfg.apply_env_overrides(env_from(&[
            ("TELEGRAM_BOT_TOKEN", "999:zzz"),
            ("TGRELAY_MODEL", "claude-sonnet-4-5"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("TGRELAY_HEARTBEAT_CHAT_ID", "12"),
        ]));
        assert_eq!(cfg.telegram.bot_token(), Some("999:zzz"));
        assert_eq!(cfg.processor.model, "claude-sonnet-4-5");
        assert_eq!(cfg.processor.api_key(), Some("sk-ant"));
        assert_eq!(cfg.heartbeat.chat_id, Some(12));
    }

    #[test]
    fn blank_env_values_do_not_override() {
        let mut cfg = RelayConfig::parse("[telegram]\nbot_token = \"from-file\"").expect("parse");
        cfg.apply_env_overrides(env_from(&[("TELEGRAM_BOT_TOKEN", "   ")]));
        assert_eq!(cfg.telegram.bot_token(), Some("from-file"));
    }

    #[test]
    fn huge_poll_timeout_saturates_and_is_rejected() {
        let mut cfg = RelayConfig::default();
        cfg.telegram.poll_timeout_secs = u64::MAX;
        assert_eq!(cfg.telegram.request_timeout(), Duration::from_secs(u64::MAX));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let bad = [
            "[telegram]\npoll_timeout_secs = 0",
            "[telegram]\npoll_timeout_secs = 30\nrequest_timeout_secs = 30",
            "[dispatch]\nbackoff_secs = 0",
            "[dispatch]\nreset_command = \"\"",
            "[dispatch]\nreset_command = \"/new now\"",
            "[dispatch]\nsession_namespace = \"a b\"",
            "[processor]\nmax_history_messages = 0",
            "[heartbeat]\nenabled = true",
            "[heartbeat]\nenabled = true\nchat_id = 1\ninterval_secs = 0",
        ];
        for raw in bad {
            let cfg = RelayConfig::parse(raw).expect("parse");
            assert!(cfg.validate().is_err(), "expected rejection for {raw:?}");
        }
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("tgrelay-missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(RelayConfig::load(Some(path)).await.is_err());
    }
}
