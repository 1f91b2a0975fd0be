//! BYO-key chat client used by the tgrelay assistant processor.
//!
//! Pure HTTP, text in and text out. No tools and no streaming.

mod anthropic;
mod client;
mod error;
mod openai;
mod types;

pub use client::{LlmClient, Provider};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatResponse, Role, Usage};
