//! Discord REST client for a single channel.
//!
//! Outbound posts go to `POST /channels/{id}/messages`. Inbound messages are
//! polled with `GET /channels/{id}/messages?after={last_id}`; the first poll
//! only records the newest id so channel history is never replayed into the
//! game.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use super::format::{split_message, DISCORD_MAX_CHARS};
use super::{ChatTransport, DiscordError, InboundMessage, ReferencedMessage};

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_ERROR_BODY_CHARS: usize = 256;
const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl ApiUser {
    fn display_name(&self) -> String {
        self.global_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.username.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: Option<ApiUser>,
    #[serde(default)]
    attachments: Vec<serde_json::Value>,
    #[serde(default)]
    referenced_message: Option<Box<ApiMessage>>,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// One page of channel history, already filtered for relaying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages from people other than the relay, oldest first.
    pub messages: Vec<InboundMessage>,
    /// Highest snowflake on the page, including filtered messages.
    pub newest_id: Option<u64>,
}

impl MessagePage {
    /// Parse a `GET /channels/{id}/messages` response body.
    ///
    /// Messages written by `self_id` or by any bot are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Parse`] if the body is not a message array.
    pub fn parse(payload: &str, self_id: Option<&str>) -> Result<Self, DiscordError> {
        let raw: Vec<ApiMessage> =
            serde_json::from_str(payload).map_err(|e| DiscordError::Parse(e.to_string()))?;

        let mut newest_id = None;
        let mut messages = Vec::with_capacity(raw.len());
        for message in raw {
            let Ok(id) = message.id.parse::<u64>() else {
                warn!(id = %message.id, "skipping message with malformed id");
                continue;
            };
            newest_id = newest_id.max(Some(id));

            let Some(author) = &message.author else {
                continue;
            };
            if author.bot || Some(author.id.as_str()) == self_id {
                continue;
            }

            messages.push(InboundMessage {
                id,
                author: author.display_name(),
                content: message.content.clone(),
                has_attachments: !message.attachments.is_empty(),
                reference: message.referenced_message.as_deref().map(|quoted| {
                    ReferencedMessage {
                        author: quoted.author.as_ref().map(ApiUser::display_name),
                        content: quoted.content.clone(),
                        has_attachments: !quoted.attachments.is_empty(),
                    }
                }),
            });
        }

        messages.sort_by_key(|m| m.id);
        Ok(Self {
            messages,
            newest_id,
        })
    }
}

/// REST client bound to one channel.
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: Url,
    channel_id: u64,
    token: String,
    self_id: Option<String>,
    last_id: Mutex<Option<u64>>,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base.as_str())
            .field("channel_id", &self.channel_id)
            .field("token", &"[REDACTED]")
            .field("self_id", &self.self_id)
            .finish()
    }
}

impl DiscordClient {
    /// Client for `channel_id` under `api_base` (e.g. `https://discord.com/api/v10`).
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Url`] if `api_base` is not a valid URL.
    pub fn new(api_base: &str, channel_id: u64, token: impl Into<String>) -> Result<Self, DiscordError> {
        // A trailing slash makes `Url::join` append instead of replacing the
        // last path segment.
        let base = format!("{}/", api_base.trim_end_matches('/'));
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: Url::parse(&base)?,
            channel_id,
            token: token.into(),
            self_id: None,
            last_id: Mutex::new(None),
        })
    }

    /// Look up the bot's own user id so its posts are not echoed back.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or the request fails.
    pub async fn identify(mut self) -> Result<Self, DiscordError> {
        let url = self.api_base.join("users/@me")?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let payload = check_http_response(response).await?;
        let me: ApiUser =
            serde_json::from_str(&payload).map_err(|e| DiscordError::Parse(e.to_string()))?;
        debug!(user = %me.username, id = %me.id, "discord identity resolved");
        self.self_id = Some(me.id);
        Ok(self)
    }

    /// Channel this client is bound to.
    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    fn messages_url(&self) -> Result<Url, DiscordError> {
        Ok(self
            .api_base
            .join(&format!("channels/{}/messages", self.channel_id))?)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("authorization", format!("Bot {}", self.token))
    }

    async fn post_chunk(&self, content: &str) -> Result<(), DiscordError> {
        let url = self.messages_url()?;
        // No pings from relayed game chat.
        let body = json!({ "content": content, "allowed_mentions": { "parse": [] } });

        let mut attempt: u32 = 0;
        loop {
            let response = self
                .authorized(self.http.post(url.clone()))
                .json(&body)
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                && attempt < MAX_RATE_LIMIT_RETRIES
            {
                let wait = retry_after(response).await;
                warn!(wait_secs = wait.as_secs_f64(), "discord rate limit hit, waiting");
                tokio::time::sleep(wait).await;
                attempt = attempt.saturating_add(1);
                continue;
            }

            check_http_response(response).await?;
            return Ok(());
        }
    }

    async fn fetch_page(&self, after: Option<u64>) -> Result<MessagePage, DiscordError> {
        let mut url = self.messages_url()?;
        {
            let mut query = url.query_pairs_mut();
            match after {
                Some(id) => {
                    query.append_pair("after", &id.to_string());
                    query.append_pair("limit", &PAGE_LIMIT.to_string());
                }
                None => {
                    query.append_pair("limit", "1");
                }
            }
        }

        let response = self.authorized(self.http.get(url)).send().await?;
        let payload = check_http_response(response).await?;
        MessagePage::parse(&payload, self.self_id.as_deref())
    }
}

#[async_trait]
impl ChatTransport for DiscordClient {
    async fn send(&self, text: &str) -> Result<(), DiscordError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        for chunk in split_message(text, DISCORD_MAX_CHARS) {
            self.post_chunk(&chunk).await?;
        }
        Ok(())
    }

    async fn fetch_new(&self) -> Result<Vec<InboundMessage>, DiscordError> {
        let mut last_id = self.last_id.lock().await;
        let page = self.fetch_page(*last_id).await?;

        let primed = last_id.is_some();
        if page.newest_id.is_some() {
            *last_id = (*last_id).max(page.newest_id);
        }
        if !primed {
            debug!(last_id = ?*last_id, "discord history skipped");
            // Empty channel: everything posted from now on is new.
            last_id.get_or_insert(0);
            return Ok(Vec::new());
        }
        Ok(page.messages)
    }
}

async fn retry_after(response: reqwest::Response) -> Duration {
    let fallback = Duration::from_secs(1);
    let Ok(text) = response.text().await else {
        return fallback;
    };
    match serde_json::from_str::<RateLimited>(&text) {
        Ok(limit) if limit.retry_after.is_finite() && limit.retry_after >= 0.0 => {
            Duration::try_from_secs_f64(limit.retry_after).unwrap_or(fallback)
        }
        _ => fallback,
    }
}

/// Return the body of a successful response, or a shortened error body.
async fn check_http_response(response: reqwest::Response) -> Result<String, DiscordError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
        let body = if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
            let shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("{shortened}...[truncated]")
        } else {
            collapsed
        };
        return Err(DiscordError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
