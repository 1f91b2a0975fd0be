//! LLM-backed processor: one rolling chat transcript per session.

use crate::processor::{Processor, ProcessorError};
use crate::router::SessionId;
use async_trait::async_trait;
use dashmap::DashMap;
use relay_llm::{ChatMessage, LlmClient};

pub struct AssistantProcessor {
    llm: LlmClient,
    system_prompt: String,
    max_history_messages: usize,
    histories: DashMap<SessionId, Vec<ChatMessage>>,
}

impl AssistantProcessor {
    pub fn new(llm: LlmClient, system_prompt: impl Into<String>, max_history_messages: usize) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            max_history_messages,
            histories: DashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.histories.len()
    }
}

#[async_trait]
impl Processor for AssistantProcessor {
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %session))]
    async fn process(&self, session: &SessionId, text: &str) -> Result<String, ProcessorError> {
        // Snapshot so no map guard is held across the model call.
        let history = self
            .histories
            .get(session)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let transcript = build_transcript(&self.system_prompt, &history, text);

        let response = self.llm.chat(&transcript).await?;
        let reply = response.message.content;
        if reply.trim().is_empty() {
            return Err(ProcessorError::EmptyReply(session.to_string()));
        }

        tracing::info!(
            model = %self.llm.model(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = %response.finish_reason,
            "assistant reply ready"
        );
        Ok(reply)
    }

    async fn commit(&self, session: &SessionId, text: &str, reply: &str) {
        let mut entry = self.histories.entry(session.clone()).or_default();
        record_turn(entry.value_mut(), text, reply, self.max_history_messages);
    }

    async fn reset(&self, session: &SessionId) -> Result<(), ProcessorError> {
        if self.histories.remove(session).is_some() {
            tracing::info!(session_id = %session, "assistant session history cleared");
        }
        Ok(())
    }
}

fn build_transcript(system_prompt: &str, history: &[ChatMessage], text: &str) -> Vec<ChatMessage> {
    let mut transcript = Vec::with_capacity(history.len() + 2);
    if !system_prompt.trim().is_empty() {
        transcript.push(ChatMessage::system(system_prompt));
    }
    transcript.extend(history.iter().cloned());
    transcript.push(ChatMessage::user(text));
    transcript
}

/// Append one exchange and drop the oldest messages beyond `max_messages`.
fn record_turn(history: &mut Vec<ChatMessage>, text: &str, reply: &str, max_messages: usize) {
    history.push(ChatMessage::user(text));
    history.push(ChatMessage::assistant(reply));
    if history.len() > max_messages {
        let excess = history.len() - max_messages;
        history.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::{AssistantProcessor, build_transcript, record_turn};
    use crate::conversation::ConversationPath;
    use crate::dispatch::{DispatchLoop, DispatchSettings, LoopState};
    use crate::offset::OffsetTracker;
    use crate::processor::Processor;
    use crate::router::SessionRouter;
    use crate::test_support::{ScriptedBackend, text_update};
    use axum::Router;
    use axum::routing::post;
    use relay_llm::{ChatMessage, LlmClient, Role};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Local stand-in for an OpenAI-compatible endpoint that always says "hi back".
    async fn spawn_model() -> String {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                axum::Json(json!({
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "hi back"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[test]
    fn transcript_starts_with_system_and_ends_with_user() {
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        let transcript = build_transcript("be kind", &history, "c");
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(transcript[3].content, "c");

        let without_system = build_transcript("  ", &[], "only");
        assert_eq!(without_system, vec![ChatMessage::user("only")]);
    }

    #[test]
    fn history_is_capped_from_the_oldest_end() {
        let mut history = Vec::new();
        record_turn(&mut history, "q1", "a1", 4);
        record_turn(&mut history, "q2", "a2", 4);
        record_turn(&mut history, "q3", "a3", 4);
        assert_eq!(
            history,
            vec![
                ChatMessage::user("q2"),
                ChatMessage::assistant("a2"),
                ChatMessage::user("q3"),
                ChatMessage::assistant("a3"),
            ]
        );
    }

    #[tokio::test]
    async fn reset_drops_only_the_given_session() {
        let llm = LlmClient::new("sk-test", "gpt-4o-mini").expect("client");
        let processor = AssistantProcessor::new(llm, "", 10);
        let router = SessionRouter::default();
        let a = router.derive_session(1);
        let b = router.derive_session(2);
        processor
            .histories
            .insert(a.clone(), vec![ChatMessage::user("x")]);
        processor
            .histories
            .insert(b.clone(), vec![ChatMessage::user("y")]);

        processor.reset(&a).await.expect("reset succeeds");
        assert_eq!(processor.session_count(), 1);
        assert!(processor.histories.contains_key(&b));

        processor.reset(&a).await.expect("reset of unknown session is fine");
    }

    #[tokio::test]
    async fn redelivered_update_after_failed_send_records_one_turn() {
        let base = spawn_model().await;
        let llm = LlmClient::new("sk-test", "gpt-4o-mini")
            .expect("client")
            .with_base_url(&base);
        let assistant = Arc::new(AssistantProcessor::new(llm, "be brief", 10));
        let backend = ScriptedBackend::with_fetches(vec![
            Ok(vec![text_update(1, 9, "hello")]),
            Ok(vec![text_update(1, 9, "hello")]),
        ]);
        *backend.fail_sends_of.lock().expect("lock") = Some("hi back".to_string());
        let mut dispatch = DispatchLoop::new(
            ConversationPath::new(backend.clone(), assistant.clone(), SessionRouter::default()),
            DispatchSettings {
                poll_timeout_secs: 0,
                backoff: Duration::from_millis(1),
                ..DispatchSettings::default()
            },
        );
        let mut cursor = OffsetTracker::default();

        let mut state = dispatch.step(LoopState::Fetching, &mut cursor).await;
        while let LoopState::Processing { .. } = state {
            state = dispatch.step(state, &mut cursor).await;
        }
        assert!(matches!(state, LoopState::BackoffWait(_)), "got {state:?}");
        assert_eq!(assistant.session_count(), 0, "undelivered turn was recorded");

        *backend.fail_sends_of.lock().expect("lock") = None;
        let state = dispatch.step(state, &mut cursor).await;
        assert!(matches!(state, LoopState::Fetching));
        let mut state = dispatch.step(state, &mut cursor).await;
        while let LoopState::Processing { .. } = state {
            state = dispatch.step(state, &mut cursor).await;
        }
        assert!(matches!(state, LoopState::Fetching), "got {state:?}");

        assert_eq!(cursor.current(), 2);
        assert_eq!(backend.sends(), vec![(9, "hi back".to_string())]);
        let session = SessionRouter::default().derive_session(9);
        let history = assistant
            .histories
            .get(&session)
            .map(|entry| entry.value().clone())
            .expect("history recorded");
        assert_eq!(
            history,
            vec![ChatMessage::user("hello"), ChatMessage::assistant("hi back")]
        );
    }
}
