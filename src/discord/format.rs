//! Text shaping between Discord and the game.

use crate::config::RelaySettings;

use super::{InboundMessage, ReferencedMessage};

/// Discord's per-message character limit.
pub const DISCORD_MAX_CHARS: usize = 2000;

const ELLIPSIS: &str = "...";

/// Rules for rendering Discord messages as in-game chat.
#[derive(Debug, Clone)]
pub struct MessageFormat {
    /// Quoted text longer than this is cut.
    pub max_ref_message_length: usize,
    /// Quoted author names longer than this are cut.
    pub max_nickname_length: usize,
    /// Marker for messages with attachments.
    pub attachment_marker: String,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

impl MessageFormat {
    /// Format rules from the relay settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            max_ref_message_length: settings.max_ref_message_length,
            max_nickname_length: settings.max_nickname_length,
            attachment_marker: settings.messages.attachment_marker.clone(),
        }
    }

    /// Render an inbound message as one line for `/say`:
    /// `<author>: [marker][[ref_author: ref_text] -> ]content`.
    pub fn render(&self, message: &InboundMessage) -> String {
        let mut out = format!("<{}>: ", message.author);
        if message.has_attachments {
            out.push_str(&self.attachment_marker);
        }
        if let Some(reference) = &message.reference {
            out.push_str(&self.render_reference(reference));
        }
        out.push_str(&message.content);
        out
    }

    /// The `[author: text] -> ` quote put in front of a reply.
    pub fn render_reference(&self, reference: &ReferencedMessage) -> String {
        let author = reference
            .author
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown");
        let marker = if reference.has_attachments {
            self.attachment_marker.as_str()
        } else {
            ""
        };
        format!(
            "[{}: {}{}] -> ",
            truncate_chars(author, self.max_nickname_length),
            marker,
            truncate_chars(&reference.content, self.max_ref_message_length),
        )
    }
}

/// Cut `text` to `max` characters, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{ELLIPSIS}", text.get(..idx).unwrap_or(text)),
        None => text.to_owned(),
    }
}

/// Split `text` into chunks of at most `max_chars` characters, preferring
/// line breaks, then spaces, as cut points.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let hard_cut = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(idx, _)| idx);
        let window = rest.get(..hard_cut).unwrap_or(rest);
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&idx| idx > 0)
            .unwrap_or(hard_cut);

        let (head, tail) = rest.split_at(cut);
        chunks.push(head.to_owned());
        rest = tail.strip_prefix(['\n', ' ']).unwrap_or(tail);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_owned());
    }
    chunks
}
