//! Chat extraction pipeline: classify log lines, apply vanish rules, and pump
//! outward-facing messages.
//!
//! Layering: [`profile`] holds the per-server-version pattern tables,
//! [`classifier`] applies them to one line, [`vanish`] decides the final
//! disposition, [`parser`] ties them to the session's server status, and
//! [`pump`] drives the whole thing from a [`crate::tail::LineSource`].

pub mod classifier;
pub mod parser;
pub mod profile;
pub mod pump;
pub mod status;
pub mod vanish;

pub use classifier::LineClassifier;
pub use parser::ChatParser;
pub use profile::FormatProfile;
pub use pump::{MessagePump, PumpOutput};
pub use status::ServerStatus;
pub use vanish::{
    MasterPerkiVanishmod, VanishConvention, VanishHandler, VanishMarker, VanishStore,
    VanishStoreError,
};

/// Errors raised while assembling the chat pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A compatibility-table pattern failed to compile.
    #[error("invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// No format profile with the requested name exists.
    #[error("unknown format profile: {0}")]
    UnknownProfile(String),
}

/// The outcome of classifying one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Nothing to relay.
    NoEvent,
    /// A lifecycle marker moved the server into a new status.
    ServerStatusChanged(ServerStatus),
    /// A player-facing line with the prefix stripped.
    PlayerMessage {
        /// Message body as players saw it.
        text: String,
        /// Acting player, when the line had a recognizable shape.
        username: Option<String>,
    },
    /// A vanish mod reported a player going (in)visible.
    VanishMarker(VanishMarker),
}

impl ChatEvent {
    /// Text to relay for this event, if any.
    ///
    /// Vanish markers render as the synthetic join/leave line. Status
    /// changes carry no text; hosts render their own banner.
    pub fn outward_text(&self) -> Option<String> {
        match self {
            Self::PlayerMessage { text, .. } => {
                let trimmed = text.trim_end();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Self::VanishMarker(marker) => Some(marker.synthetic_line()),
            Self::NoEvent | Self::ServerStatusChanged(_) => None,
        }
    }
}
