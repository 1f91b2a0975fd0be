use std::fmt;

/// Non-text payloads the relay recognizes but cannot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedKind {
    Voice,
    Audio,
}

impl UnsupportedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for UnsupportedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound event, normalized from the backend's wire format.
///
/// `chat_id` is `None` for updates that carry no message at all (edits,
/// reactions, membership changes). `text` and `unsupported` are independent:
/// either, both or neither may be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub chat_id: Option<i64>,
    pub text: Option<String>,
    pub unsupported: Option<UnsupportedKind>,
}

impl Update {
    /// The offset that acknowledges this update.
    pub fn next_offset(&self) -> i64 {
        self.update_id.saturating_add(1)
    }
}
