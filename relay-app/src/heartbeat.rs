//! Periodically surfaces a prompt file into one conversation.
//!
//! Runs beside the dispatch loop and shares nothing with it but the
//! conversation path: the prompt is handed to the processor like any other
//! message and the reply is sent back to the configured chat.

use crate::conversation::ConversationPath;
use crate::dispatch::DispatchError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Heartbeat {
    path: ConversationPath,
    prompt_path: PathBuf,
    chat_id: i64,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        path: ConversationPath,
        prompt_path: impl Into<PathBuf>,
        chat_id: i64,
        interval: Duration,
    ) -> Self {
        Self {
            path,
            prompt_path: prompt_path.into(),
            chat_id,
            interval,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(chat_id = self.chat_id))]
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            prompt_path = %self.prompt_path.display(),
            interval = ?self.interval,
            "heartbeat started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("heartbeat stopped");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            match self.tick().await {
                Ok(true) => tracing::info!("heartbeat prompt delivered"),
                Ok(false) => tracing::debug!("heartbeat prompt empty; skipped"),
                Err(error) => {
                    tracing::warn!(error_kind = error.kind(), %error, "heartbeat delivery failed")
                }
            }
        }
    }

    /// Inject the prompt once. Returns false when there was nothing to send.
    pub async fn tick(&self) -> Result<bool, DispatchError> {
        let Some(prompt) = read_prompt(&self.prompt_path).await else {
            return Ok(false);
        };
        self.path
            .respond_in_conversation(self.chat_id, &prompt)
            .await?;
        Ok(true)
    }
}

async fn read_prompt(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if !contents.trim().is_empty() => Some(contents.trim().to_string()),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "heartbeat prompt unreadable");
            None
        }
    }
}
