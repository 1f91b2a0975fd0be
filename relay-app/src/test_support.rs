//! In-memory fakes for the backend and processor seams.

use crate::processor::{Processor, ProcessorError};
use crate::router::SessionId;
use async_trait::async_trait;
use relay_channels::{BackendError, Update, UpdateBackend};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ScriptedBackend {
    pub fetches: Mutex<VecDeque<relay_channels::Result<Vec<Update>>>>,
    pub offsets_seen: Mutex<Vec<i64>>,
    pub sends: Mutex<Vec<(i64, String)>>,
    pub fail_sends_of: Mutex<Option<String>>,
}

impl ScriptedBackend {
    pub fn with_fetches(fetches: Vec<relay_channels::Result<Vec<Update>>>) -> Arc<Self> {
        Arc::new(Self {
            fetches: Mutex::new(fetches.into()),
            ..Self::default()
        })
    }

    pub fn sends(&self) -> Vec<(i64, String)> {
        self.sends.lock().expect("lock").clone()
    }

    pub fn offsets_seen(&self) -> Vec<i64> {
        self.offsets_seen.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UpdateBackend for ScriptedBackend {
    fn backend_id(&self) -> &str {
        "scripted"
    }

    async fn fetch_updates(
        &self,
        offset: i64,
        _timeout_secs: u64,
    ) -> relay_channels::Result<Vec<Update>> {
        self.offsets_seen.lock().expect("lock").push(offset);
        self.fetches
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> relay_channels::Result<()> {
        if self.fail_sends_of.lock().expect("lock").as_deref() == Some(text) {
            return Err(BackendError::Transport("send refused".to_string()));
        }
        self.sends
            .lock()
            .expect("lock")
            .push((chat_id, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProcessor {
    pub calls: Mutex<Vec<(String, String)>>,
    pub resets: Mutex<Vec<String>>,
    pub commits: Mutex<Vec<(String, String)>>,
    pub fail_on: Option<String>,
}

impl RecordingProcessor {
    pub fn failing_on(text: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(text.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().expect("lock").clone()
    }

    pub fn commits(&self) -> Vec<(String, String)> {
        self.commits.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, session: &SessionId, text: &str) -> Result<String, ProcessorError> {
        self.calls
            .lock()
            .expect("lock")
            .push((session.to_string(), text.to_string()));
        if self.fail_on.as_deref() == Some(text) {
            return Err(ProcessorError::Failed("model unavailable".to_string()));
        }
        Ok(format!("reply to {text}"))
    }

    async fn commit(&self, session: &SessionId, text: &str, _reply: &str) {
        self.commits
            .lock()
            .expect("lock")
            .push((session.to_string(), text.to_string()));
    }

    async fn reset(&self, session: &SessionId) -> Result<(), ProcessorError> {
        self.resets.lock().expect("lock").push(session.to_string());
        Ok(())
    }
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        chat_id: Some(chat_id),
        text: Some(text.to_string()),
        unsupported: None,
    }
}
