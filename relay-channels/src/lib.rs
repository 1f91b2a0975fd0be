//! Backend clients for tgrelay.
//!
//! Clients are pure I/O: they turn the messaging backend's long-poll wire
//! format into `Update`s and deliver replies. Retry policy lives with callers.

mod error;
mod telegram;
mod traits;
mod types;

pub use error::{BackendError, Result};
pub use telegram::{BotIdentity, TELEGRAM_DEFAULT_API_BASE, TelegramBackend};
pub use traits::UpdateBackend;
pub use types::{UnsupportedKind, Update};
