//! Layered classification of raw server log lines.
//!
//! Order: status markers, eligibility gate, prefix stripping, message shape.
//! The pattern tables live in [`FormatProfile`]; this module only holds the
//! control flow.

use regex::Regex;

use super::{ChatError, ChatEvent, FormatProfile, ServerStatus};

/// Player name: a letter followed by letters, digits or underscores.
pub(crate) const USERNAME_PATTERN: &str = r"[a-zA-Z][a-zA-Z0-9_]*";

/// Classifies single log lines against a [`FormatProfile`].
#[derive(Debug, Clone)]
pub struct LineClassifier {
    profile: FormatProfile,
    message_shape: Regex,
}

impl LineClassifier {
    /// Build a classifier for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if the message shape fails to compile.
    pub fn new(profile: FormatProfile) -> Result<Self, ChatError> {
        // `<name> text` for chat, `name verb text` for event sentences.
        let message_shape = Regex::new(&format!(
            r"^<({u})> .*$|^({u}) [a-zA-Z][a-zA-Z0-9_]* .*$",
            u = USERNAME_PATTERN
        ))?;
        Ok(Self {
            profile,
            message_shape,
        })
    }

    /// Profile this classifier applies.
    pub fn profile(&self) -> &FormatProfile {
        &self.profile
    }

    /// Classify one line given the session's current status.
    ///
    /// Bodies with no recognizable shape come back as a
    /// [`ChatEvent::PlayerMessage`] without a username; the vanish stage
    /// decides whether they are markers or noise.
    pub fn classify(&self, raw_line: &str, current: ServerStatus) -> ChatEvent {
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if let Some(status) = self.detect_status(line) {
            return ChatEvent::ServerStatusChanged(status);
        }

        if !current.is_running() || !self.has_gate_prefix(line) {
            return ChatEvent::NoEvent;
        }

        let body = self.strip_prefixes(line);
        let username = self.extract_username(body);
        ChatEvent::PlayerMessage {
            text: body.to_owned(),
            username,
        }
    }

    /// Match the line against the profile's status markers, first wins.
    pub fn detect_status(&self, line: &str) -> Option<ServerStatus> {
        self.profile
            .status_markers()
            .iter()
            .find(|marker| marker.pattern.is_match(line))
            .map(|marker| marker.status)
    }

    /// Whether the line carries one of the "server said this" prefixes.
    pub fn has_gate_prefix(&self, line: &str) -> bool {
        self.profile
            .gate_prefixes()
            .iter()
            .any(|prefix| line.contains(prefix.as_str()))
    }

    /// Keep only the text after the last occurrence of each known prefix.
    ///
    /// Prefixes that do not occur leave the line untouched, so stripping is
    /// idempotent.
    pub fn strip_prefixes<'a>(&self, line: &'a str) -> &'a str {
        self.profile
            .strip_prefixes()
            .fold(line, |body, prefix| match body.rfind(prefix) {
                Some(idx) => body.get(idx.saturating_add(prefix.len())..).unwrap_or(""),
                None => body,
            })
    }

    /// Leading player name when the body has a chat or event shape.
    pub fn extract_username(&self, body: &str) -> Option<String> {
        let caps = self.message_shape.captures(body)?;
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_owned())
    }
}
