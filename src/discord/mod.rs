//! Discord side of the relay.
//!
//! [`ChatTransport`] is the seam the relay session talks to; [`DiscordClient`]
//! implements it over the REST API with `reqwest`. Message text shaping
//! (quoting replies, splitting long posts) lives in [`format`].

use async_trait::async_trait;

pub mod client;
pub mod format;

pub use client::{DiscordClient, MessagePage};
pub use format::MessageFormat;

/// Errors returned by the Discord transport.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    /// HTTP transport failure.
    #[error("discord request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("discord response parse error: {0}")]
    Parse(String),
    /// Discord answered with an error status.
    #[error("discord returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, shortened.
        body: String,
    },
    /// The configured API base is not a valid URL.
    #[error("invalid discord api url: {0}")]
    Url(#[from] url::ParseError),
}

/// A message quoted by a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedMessage {
    /// Display name of the quoted author, when known.
    pub author: Option<String>,
    /// Quoted text.
    pub content: String,
    /// Whether the quoted message carried attachments.
    pub has_attachments: bool,
}

/// A message posted in the relay channel by a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Message snowflake.
    pub id: u64,
    /// Author display name.
    pub author: String,
    /// Message text.
    pub content: String,
    /// Whether the message carried attachments.
    pub has_attachments: bool,
    /// The message this one replies to.
    pub reference: Option<ReferencedMessage>,
}

impl InboundMessage {
    /// Whether this is a channel command such as `/list`.
    pub fn is_command(&self) -> bool {
        self.content.starts_with('/')
    }
}

/// Posts to and reads from the relay channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post `text` to the channel.
    async fn send(&self, text: &str) -> Result<(), DiscordError>;

    /// Messages posted by others since the previous call, oldest first.
    async fn fetch_new(&self) -> Result<Vec<InboundMessage>, DiscordError>;
}
