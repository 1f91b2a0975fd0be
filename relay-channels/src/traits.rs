use crate::error::Result;
use crate::types::Update;
use async_trait::async_trait;

#[async_trait]
pub trait UpdateBackend: Send + Sync {
    /// Backend identifier used in logs: "telegram".
    fn backend_id(&self) -> &str;

    /// Long-poll for updates at or after `offset`. The backend may hold the
    /// request open for up to `timeout_secs`; an empty batch is a normal result.
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>>;

    /// Deliver `text` to a conversation. No retries at this layer.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}
