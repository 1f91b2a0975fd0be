//! Decide what, if anything, an update asks the relay to do.

use relay_channels::{UnsupportedKind, Update};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Usable text. `also_unsupported` is set when the same message carried a
    /// payload we cannot handle; the notice for it is sent before the text is
    /// processed.
    Text {
        chat_id: i64,
        body: String,
        also_unsupported: Option<UnsupportedKind>,
    },
    Unsupported {
        chat_id: i64,
        kind: UnsupportedKind,
    },
    Empty,
}

pub fn classify(update: &Update) -> Content {
    let Some(chat_id) = update.chat_id else {
        return Content::Empty;
    };

    let body = update
        .text
        .as_deref()
        .filter(|text| !text.trim().is_empty());

    match (body, update.unsupported) {
        (Some(body), also_unsupported) => Content::Text {
            chat_id,
            body: body.to_string(),
            also_unsupported,
        },
        (None, Some(kind)) => Content::Unsupported { chat_id, kind },
        (None, None) => Content::Empty,
    }
}
