//! The route a message takes from a conversation to the processor and back.
//!
//! Shared by the dispatch loop and the heartbeat. Holds no cursor state.

use crate::dispatch::DispatchError;
use crate::processor::Processor;
use crate::router::{SessionId, SessionRouter};
use relay_channels::UpdateBackend;
use std::sync::Arc;

#[derive(Clone)]
pub struct ConversationPath {
    backend: Arc<dyn UpdateBackend>,
    processor: Arc<dyn Processor>,
    router: SessionRouter,
}

impl ConversationPath {
    pub fn new(
        backend: Arc<dyn UpdateBackend>,
        processor: Arc<dyn Processor>,
        router: SessionRouter,
    ) -> Self {
        Self {
            backend,
            processor,
            router,
        }
    }

    pub fn backend(&self) -> &Arc<dyn UpdateBackend> {
        &self.backend
    }

    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Run `text` through the processor under `session` and send the reply,
    /// unmodified, to `chat_id`. The exchange is committed only after the send.
    #[tracing::instrument(level = "info", skip(self, text), fields(session_id = %session))]
    pub async fn respond(
        &self,
        chat_id: i64,
        session: &SessionId,
        text: &str,
    ) -> Result<(), DispatchError> {
        let reply = self.processor.process(session, text).await?;
        self.backend.send_message(chat_id, &reply).await?;
        self.processor.commit(session, text, &reply).await;
        Ok(())
    }

    /// Same as `respond`, deriving the session from the conversation.
    pub async fn respond_in_conversation(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        let session = self.router.derive_session(chat_id);
        self.respond(chat_id, &session, text).await
    }

    pub async fn notify(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        self.backend.send_message(chat_id, text).await?;
        Ok(())
    }
}
