//! Update ingestion and dispatch loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Fetching ──(empty batch)──────────────▶ Fetching
//! Fetching ──(N updates)────────────────▶ Processing ──(batch drained)──▶ Fetching
//! Fetching | Processing ──(any error)───▶ BackoffWait ──(fixed pause)───▶ Fetching
//! ```
//!
//! The cursor advances per update, right after that update's side effects
//! finished, so an error part-way through a batch keeps the progress made so
//! far and re-fetches the rest. Delivery is at-least-once.

use crate::classify::{Content, classify};
use crate::conversation::ConversationPath;
use crate::cursor_store::CursorStore;
use crate::offset::OffsetTracker;
use crate::processor::ProcessorError;
use crate::router::Command;
use relay_channels::{BackendError, Update};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_RESET_REPLY: &str = "Started a new conversation.";
pub const DEFAULT_UNSUPPORTED_NOTICE: &str =
    "Sorry, I can only read text messages. Voice and audio are not supported yet.";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("backend: {0}")]
    Backend(#[from] BackendError),

    #[error("processor: {0}")]
    Processor(#[from] ProcessorError),
}

impl DispatchError {
    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(e) if e.is_decode() => "decode",
            Self::Backend(_) => "transient_backend",
            Self::Processor(_) => "processor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub poll_timeout_secs: u64,
    pub backoff: Duration,
    pub reset_reply: String,
    pub unsupported_notice: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            backoff: DEFAULT_BACKOFF,
            reset_reply: DEFAULT_RESET_REPLY.to_string(),
            unsupported_notice: DEFAULT_UNSUPPORTED_NOTICE.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum LoopState {
    Fetching,
    Processing {
        batch: VecDeque<Update>,
        handled: usize,
    },
    BackoffWait(DispatchError),
}

pub struct DispatchLoop {
    path: ConversationPath,
    settings: DispatchSettings,
    cursor_store: Option<CursorStore>,
    checkpointed: Option<i64>,
}

impl DispatchLoop {
    pub fn new(path: ConversationPath, settings: DispatchSettings) -> Self {
        Self {
            path,
            settings,
            cursor_store: None,
            checkpointed: None,
        }
    }

    pub fn with_cursor_store(mut self, store: CursorStore) -> Self {
        self.cursor_store = Some(store);
        self
    }

    /// Run until the task is dropped. Never returns on its own.
    #[tracing::instrument(level = "info", skip_all, fields(backend = %self.path.backend().backend_id()))]
    pub async fn run(&mut self, cursor: &mut OffsetTracker) {
        tracing::info!(
            offset = cursor.current(),
            poll_timeout_secs = self.settings.poll_timeout_secs,
            backoff = ?self.settings.backoff,
            "dispatch loop started"
        );
        self.checkpointed = Some(cursor.current());
        let mut state = LoopState::Fetching;
        loop {
            state = self.step(state, cursor).await;
        }
    }

    /// Perform one transition of the state machine.
    pub async fn step(&mut self, state: LoopState, cursor: &mut OffsetTracker) -> LoopState {
        match state {
            LoopState::Fetching => {
                let offset = cursor.current();
                match self
                    .path
                    .backend()
                    .fetch_updates(offset, self.settings.poll_timeout_secs)
                    .await
                {
                    Ok(updates) if updates.is_empty() => LoopState::Fetching,
                    Ok(updates) => {
                        tracing::debug!(offset, count = updates.len(), "fetched update batch");
                        LoopState::Processing {
                            batch: updates.into(),
                            handled: 0,
                        }
                    }
                    Err(e) => LoopState::BackoffWait(e.into()),
                }
            }
            LoopState::Processing { mut batch, handled } => {
                let Some(update) = batch.pop_front() else {
                    tracing::info!(handled, offset = cursor.current(), "dispatch cycle complete");
                    self.checkpoint(cursor).await;
                    return LoopState::Fetching;
                };
                match self.handle_update(update, cursor).await {
                    Ok(()) => LoopState::Processing {
                        batch,
                        handled: handled + 1,
                    },
                    Err(e) => {
                        if !batch.is_empty() {
                            tracing::debug!(
                                abandoned = batch.len(),
                                "abandoning rest of batch until next fetch"
                            );
                        }
                        LoopState::BackoffWait(e)
                    }
                }
            }
            LoopState::BackoffWait(error) => {
                tracing::error!(
                    error_kind = error.kind(),
                    %error,
                    offset = cursor.current(),
                    delay = ?self.settings.backoff,
                    "dispatch cycle failed; backing off before next fetch"
                );
                self.checkpoint(cursor).await;
                tokio::time::sleep(self.settings.backoff).await;
                LoopState::Fetching
            }
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(update_id = update.update_id, chat_id = ?update.chat_id))]
    async fn handle_update(
        &self,
        update: Update,
        cursor: &mut OffsetTracker,
    ) -> Result<(), DispatchError> {
        if update.update_id < cursor.current() {
            tracing::debug!(offset = cursor.current(), "skipping already acknowledged update");
            return Ok(());
        }

        match classify(&update) {
            Content::Empty => {
                tracing::debug!("no actionable content");
            }
            Content::Unsupported { chat_id, kind } => {
                tracing::info!(%kind, "unsupported content; sending notice");
                self.path
                    .notify(chat_id, &self.settings.unsupported_notice)
                    .await?;
            }
            Content::Text {
                chat_id,
                body,
                also_unsupported,
            } => {
                if let Some(kind) = also_unsupported {
                    // Best-effort: the text below is still the main job.
                    if let Err(error) = self
                        .path
                        .notify(chat_id, &self.settings.unsupported_notice)
                        .await
                    {
                        tracing::warn!(%kind, %error, "unsupported-content notice failed");
                    }
                }
                self.handle_text(chat_id, &body).await?;
            }
        }

        cursor.advance(update.next_offset());
        Ok(())
    }

    async fn handle_text(&self, chat_id: i64, body: &str) -> Result<(), DispatchError> {
        let session = self.path.router().derive_session(chat_id);
        match self.path.router().detect_command(body) {
            Some(Command::ResetAll) => {
                self.path.processor().reset(&session).await?;
                tracing::info!(session_id = %session, "session reset");
                self.path.notify(chat_id, &self.settings.reset_reply).await
            }
            Some(Command::ResetWithRemainder(remainder)) => {
                self.path.processor().reset(&session).await?;
                tracing::info!(session_id = %session, "session reset with follow-up text");
                self.path.respond(chat_id, &session, remainder).await
            }
            None => self.path.respond(chat_id, &session, body).await,
        }
    }

    async fn checkpoint(&mut self, cursor: &OffsetTracker) {
        let Some(store) = self.cursor_store.as_ref() else {
            return;
        };
        let offset = cursor.current();
        if self.checkpointed == Some(offset) {
            return;
        }
        store.save(offset).await;
        self.checkpointed = Some(offset);
    }
}
