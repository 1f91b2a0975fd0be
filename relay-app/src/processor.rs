//! Seam between the dispatch loop and whatever turns a message into a reply.

use crate::router::SessionId;
use async_trait::async_trait;
use relay_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("processor produced an empty reply for session {0}")]
    EmptyReply(String),

    #[error("processing failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Processor: Send + Sync {
    /// Produce the reply for `text` within `session`. May be slow; may fail.
    async fn process(&self, session: &SessionId, text: &str) -> Result<String, ProcessorError>;

    /// Called once the reply from `process` reached the chat. Anything the
    /// processor remembers about the exchange belongs here, since a reply that
    /// was never delivered is processed again on redelivery.
    async fn commit(&self, _session: &SessionId, _text: &str, _reply: &str) {}

    /// Drop whatever state is kept for `session`.
    async fn reset(&self, _session: &SessionId) -> Result<(), ProcessorError> {
        Ok(())
    }
}
