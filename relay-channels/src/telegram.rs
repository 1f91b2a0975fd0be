use crate::error::{BackendError, Result};
use crate::traits::UpdateBackend;
use crate::types::{UnsupportedKind, Update};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

const TELEGRAM_BACKEND_ID: &str = "telegram";
pub const TELEGRAM_DEFAULT_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Clone)]
pub struct TelegramBackend {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: String,
}

impl TelegramBackend {
    /// `request_timeout` bounds a whole HTTP exchange and must exceed the
    /// long-poll timeout passed to `fetch_updates`.
    pub fn new(bot_token: &str, request_timeout: Duration) -> Result<Self> {
        let bot_token = bot_token.trim();
        if bot_token.is_empty() {
            return Err(BackendError::InvalidInput(
                "telegram bot token is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            api_base_url: TELEGRAM_DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    pub fn with_api_base_url(mut self, api_base_url: &str) -> Result<Self> {
        let trimmed = api_base_url.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|e| {
            BackendError::InvalidInput(format!("invalid telegram api base {trimmed:?}: {e}"))
        })?;
        self.api_base_url = trimmed.to_string();
        Ok(self)
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Url::parse(&format!(
            "{}/bot{}/{}",
            self.api_base_url, self.bot_token, method
        ))
        .map_err(|e| BackendError::InvalidInput(format!("invalid telegram url for {method}: {e}")))
    }

    /// Resolve the bot identity behind the configured token.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn get_me(&self) -> Result<BotIdentity> {
        let url = self.api_url("getMe")?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                method: "getMe",
                status: status.as_u16(),
                body,
            });
        }
        let envelope: GetMeEnvelope = serde_json::from_str(&body)?;
        match (envelope.ok, envelope.result) {
            (true, Some(identity)) => Ok(identity),
            (true, None) => Err(BackendError::Decode(
                "getMe returned ok without a result".to_string(),
            )),
            (false, _) => Err(BackendError::Rejected {
                method: "getMe",
                description: envelope.description.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl UpdateBackend for TelegramBackend {
    fn backend_id(&self) -> &str {
        TELEGRAM_BACKEND_ID
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let url = self.api_url("getUpdates")?;
        let response = self
            .http
            .get(url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                method: "getUpdates",
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GetUpdatesEnvelope = serde_json::from_str(&body)?;
        if !envelope.ok {
            return Err(BackendError::Rejected {
                method: "getUpdates",
                description: envelope.description.unwrap_or_default(),
            });
        }

        let updates: Vec<Update> = envelope.result.into_iter().map(Update::from).collect();
        tracing::debug!(count = updates.len(), "telegram getUpdates returned");
        Ok(updates)
    }

    /// Replies over the size limit go out as several messages. A failure part
    /// way through leaves the earlier chunks delivered; the caller resends the
    /// whole reply.
    #[tracing::instrument(level = "debug", skip(self, text), fields(chars = text.chars().count()))]
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = self.api_url("sendMessage")?;
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_CHARS) {
            let body = serde_json::json!({
                "chat_id": chat_id.to_string(),
                "text": chunk,
            });
            let response = self.http.post(url.clone()).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                return Err(BackendError::Status {
                    method: "sendMessage",
                    status: status.as_u16(),
                    body,
                });
            }
        }
        Ok(())
    }
}

/// Split `text` into pieces of at most `max_chars` characters, preferring to
/// break after a newline. Always yields at least one piece.
fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;
    loop {
        let Some((cut, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining);
            return chunks;
        };
        let cut = match remaining[..cut].rfind('\n') {
            Some(newline) if newline > 0 => newline + 1,
            _ => cut,
        };
        chunks.push(&remaining[..cut]);
        remaining = &remaining[cut..];
        if remaining.is_empty() {
            return chunks;
        }
    }
}

/// `getUpdates` response envelope. Fields not listed here are ignored.
#[derive(Debug, Deserialize)]
pub struct GetUpdatesEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub result: Vec<WireUpdate>,
    /// Human-readable reason, set when `ok` is false.
    #[serde(default)]
    pub description: Option<String>,
}

/// One element of `getUpdates.result`.
#[derive(Debug, Deserialize)]
pub struct WireUpdate {
    pub update_id: i64,
    /// Absent for non-message updates (edited messages, reactions, ...).
    #[serde(default)]
    pub message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub chat: Option<WireChat>,
    #[serde(default)]
    pub text: Option<String>,
    /// Voice notes. Only presence matters.
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
    /// Audio files. Only presence matters.
    #[serde(default)]
    pub audio: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct GetMeEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<BotIdentity>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<WireUpdate> for Update {
    fn from(wire: WireUpdate) -> Self {
        let Some(message) = wire.message else {
            return Update {
                update_id: wire.update_id,
                chat_id: None,
                text: None,
                unsupported: None,
            };
        };
        let unsupported = if message.voice.is_some() {
            Some(UnsupportedKind::Voice)
        } else if message.audio.is_some() {
            Some(UnsupportedKind::Audio)
        } else {
            None
        };
        Update {
            update_id: wire.update_id,
            chat_id: message.chat.map(|chat| chat.id),
            text: message.text,
            unsupported,
        }
    }
}
