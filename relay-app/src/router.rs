//! Session identity and the in-band command grammar.

use std::fmt;

pub const DEFAULT_SESSION_NAMESPACE: &str = "tg";
pub const DEFAULT_RESET_COMMAND: &str = "/new";

/// Key under which the processor keeps per-conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// The reset token and nothing else.
    ResetAll,
    /// The reset token followed by text to process in the fresh session.
    ResetWithRemainder(&'a str),
}

#[derive(Debug, Clone)]
pub struct SessionRouter {
    namespace: String,
    reset_command: String,
}

impl Default for SessionRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_NAMESPACE, DEFAULT_RESET_COMMAND)
    }
}

impl SessionRouter {
    pub fn new(namespace: impl Into<String>, reset_command: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            reset_command: reset_command.into(),
        }
    }

    pub fn derive_session(&self, chat_id: i64) -> SessionId {
        SessionId(format!("{}_{}", self.namespace, chat_id))
    }

    /// Match the reset token at the very start of `text`. Case-sensitive; the
    /// token must be followed by whitespace or the end of the message, so
    /// `/newer` is not a reset.
    pub fn detect_command<'a>(&self, text: &'a str) -> Option<Command<'a>> {
        let rest = text.strip_prefix(self.reset_command.as_str())?;
        if rest.trim().is_empty() {
            return Some(Command::ResetAll);
        }
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(Command::ResetWithRemainder(rest.trim_start()))
    }
}
