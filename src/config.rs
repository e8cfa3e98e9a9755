//! Configuration loading for the relay.
//!
//! Loads `config.toml` with per-section defaults. All sections use
//! `#[serde(default)]` so a minimal or empty file parses; [`RelayConfig::validate`]
//! enforces the values the bridge cannot run without. Secrets never live here,
//! only the names of the environment variables that hold them.
//!
//! Precedence: env overrides > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::tail::observer::{ObserverConfig, OverflowPolicy};

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Minecraft server location and log format.
    pub server: ServerConfig,
    /// Background log observer.
    pub tail: TailConfig,
    /// How commands reach the server console.
    pub console: ConsoleConfig,
    /// Discord channel the relay talks to.
    pub discord: DiscordConfig,
    /// Relay loop timing and message texts.
    pub relay: RelaySettings,
}

/// Minecraft server location and log format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server root; the live log is `<root_dir>/logs/latest.log`.
    pub root_dir: PathBuf,
    /// Log format profile name (`rcon_markers` or `forge_banners`).
    pub profile: String,
    /// Whether to treat the server as running before any status marker.
    pub assume_running: bool,
    /// Vanished players file. Defaults to `data/vanished.json` under the
    /// relay's runtime directory.
    pub vanish_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            profile: default_profile(),
            assume_running: true,
            vanish_file: None,
        }
    }
}

/// Background log observer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Poll the log from a background task instead of the relay loop.
    pub background: bool,
    /// Milliseconds between background polls.
    pub observe_interval_ms: u64,
    /// Maximum lines queued for the relay loop.
    pub queue_capacity: usize,
    /// Behaviour when the queue is full: `defer` or `block`.
    pub overflow: OverflowSetting,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            background: false,
            observe_interval_ms: default_observe_interval_ms(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowSetting::Defer,
        }
    }
}

impl TailConfig {
    /// Observer tuning derived from these settings.
    pub fn observer_config(&self) -> ObserverConfig {
        ObserverConfig {
            interval: Duration::from_millis(self.observe_interval_ms),
            queue_capacity: self.queue_capacity,
            overflow: match self.overflow {
                OverflowSetting::Defer => OverflowPolicy::Defer,
                OverflowSetting::Block => OverflowPolicy::Block,
            },
        }
    }
}

/// Serialized form of [`OverflowPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowSetting {
    /// Skip the poll and warn.
    #[default]
    Defer,
    /// Wait for room in the queue.
    Block,
}

/// Console transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    /// Source RCON over TCP.
    #[default]
    Rcon,
    /// `rcon-cli` executed inside a Docker container.
    Docker,
}

/// How commands reach the server console.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Transport kind.
    pub kind: ConsoleKind,
    /// RCON host.
    pub host: String,
    /// RCON port.
    pub port: u16,
    /// Environment variable holding the RCON password.
    pub password_env: String,
    /// Container name for the Docker transport.
    pub container: String,
    /// Minimum seconds between RCON reconnect attempts.
    pub reconnect_interval_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            kind: ConsoleKind::Rcon,
            host: default_host(),
            port: default_rcon_port(),
            password_env: default_password_env(),
            container: default_container(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

impl ConsoleConfig {
    /// Reconnect spacing as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

/// Discord channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Channel the relay reads from and writes to.
    pub channel_id: u64,
    /// Environment variable holding the bot token.
    pub token_env: String,
    /// REST API base URL.
    pub api_base: String,
    /// Milliseconds between channel polls.
    pub inbound_poll_ms: u64,
}

impl DiscordConfig {
    /// Channel poll spacing as a [`Duration`].
    pub fn inbound_poll_interval(&self) -> Duration {
        Duration::from_millis(self.inbound_poll_ms)
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            token_env: default_token_env(),
            api_base: default_api_base(),
            inbound_poll_ms: default_inbound_poll_ms(),
        }
    }
}

/// Relay loop timing and message texts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Milliseconds between outbound pump steps.
    pub poll_interval_ms: u64,
    /// Quoted reply text longer than this is cut and suffixed with `...`.
    pub max_ref_message_length: usize,
    /// Quoted reply author longer than this is cut and suffixed with `...`.
    pub max_nickname_length: usize,
    /// Fixed texts sent by the relay.
    pub messages: RelayMessages,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_ref_message_length: default_max_ref_message_length(),
            max_nickname_length: default_max_nickname_length(),
            messages: RelayMessages::default(),
        }
    }
}

impl RelaySettings {
    /// Outbound pump spacing as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Fixed texts the relay sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayMessages {
    /// Channel banner when the server stops.
    pub server_stopped: String,
    /// Channel banner when the server is up.
    pub server_started: String,
    /// Channel notice when the relay connects.
    pub bot_joined_chat: String,
    /// Channel notice when the relay shuts down.
    pub bot_left_chat: String,
    /// In-game notice when the relay connects.
    pub bot_joined_game: String,
    /// Reply when a message cannot reach the console.
    pub console_unavailable: String,
    /// Reply when `/list` fails.
    pub list_failed: String,
    /// Reply when `/tps` fails.
    pub tps_failed: String,
    /// Prefix of the `/info` reply.
    pub available_commands: String,
    /// Prefix of the reply to an unknown command.
    pub unknown_command: String,
    /// Marker put in front of messages with attachments.
    pub attachment_marker: String,
}

impl Default for RelayMessages {
    fn default() -> Self {
        Self {
            server_stopped: "# Server stopped.".to_owned(),
            server_started: "# Server started.".to_owned(),
            bot_joined_chat: "## Discord joined the chat.".to_owned(),
            bot_left_chat: "## Discord left the chat.".to_owned(),
            bot_joined_game: "Discord joined the game".to_owned(),
            console_unavailable: "The server is currently unavailable.".to_owned(),
            list_failed: "Could not get the player list.".to_owned(),
            tps_failed: "Could not get the server TPS.".to_owned(),
            available_commands: "Available commands: ".to_owned(),
            unknown_command: "Unknown command. Available commands: ".to_owned(),
            attachment_marker: "[image] ".to_owned(),
        }
    }
}

/// Resolved filesystem paths for the relay's own state.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Root directory (`~/.mcrelay/`).
    pub root: PathBuf,
    /// Default config file.
    pub config_file: PathBuf,
    /// Secrets file.
    pub env_file: PathBuf,
    /// Persistent state directory.
    pub data_dir: PathBuf,
    /// Default vanished players file.
    pub vanish_file: PathBuf,
    /// Rolling log directory.
    pub logs_dir: PathBuf,
}

impl RuntimePaths {
    /// Lay out the runtime paths under an explicit root.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join("data");
        Self {
            config_file: root.join("config.toml"),
            env_file: root.join(".env"),
            vanish_file: data_dir.join("vanished.json"),
            logs_dir: root.join("logs"),
            data_dir,
            root,
        }
    }
}

impl RelayConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong value types.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Validate that the values needed by the full bridge are present and
    /// within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.discord.channel_id != 0, "discord.channel_id must be set");
        anyhow::ensure!(
            (10..=10_000).contains(&self.relay.poll_interval_ms),
            "relay.poll_interval_ms must be in [10, 10000]"
        );
        anyhow::ensure!(
            self.discord.inbound_poll_ms >= 500,
            "discord.inbound_poll_ms must be >= 500"
        );
        anyhow::ensure!(
            crate::chat::FormatProfile::NAMES.contains(&self.server.profile.as_str()),
            "server.profile must be one of {:?}",
            crate::chat::FormatProfile::NAMES
        );
        match self.console.kind {
            ConsoleKind::Rcon => {
                anyhow::ensure!(self.console.port != 0, "console.port must be non-zero");
                anyhow::ensure!(
                    !self.console.host.trim().is_empty(),
                    "console.host must be set for rcon"
                );
            }
            ConsoleKind::Docker => {
                anyhow::ensure!(
                    !self.console.container.trim().is_empty(),
                    "console.container must be set for docker"
                );
            }
        }
        anyhow::ensure!(
            self.tail.observe_interval_ms >= 10,
            "tail.observe_interval_ms must be >= 10"
        );
        Ok(())
    }

    /// Vanished players file: the configured one, or the runtime default.
    pub fn vanish_file(&self, paths: &RuntimePaths) -> PathBuf {
        self.server
            .vanish_file
            .clone()
            .unwrap_or_else(|| paths.vanish_file.clone())
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests need not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("MCRELAY_SERVER_ROOT") {
            self.server.root_dir = PathBuf::from(v);
        }
        if let Some(v) = env("MCRELAY_CHANNEL_ID") {
            match v.parse() {
                Ok(id) => self.discord.channel_id = id,
                Err(_) => warn!(
                    var = "MCRELAY_CHANNEL_ID",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MCRELAY_CONSOLE_HOST") {
            self.console.host = v;
        }
        if let Some(v) = env("MCRELAY_CONSOLE_PORT") {
            match v.parse() {
                Ok(port) => self.console.port = port,
                Err(_) => warn!(
                    var = "MCRELAY_CONSOLE_PORT",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

/// Load configuration from a TOML file and apply env overrides.
///
/// A missing file yields defaults; call [`RelayConfig::validate`] before
/// running the full bridge.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<RelayConfig> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::info!(path = %path.display(), "loading config from file");
            RelayConfig::from_toml(&contents)
                .with_context(|| format!("invalid config at {}", path.display()))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            RelayConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config at {}", path.display()))
        }
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Resolve the default runtime directory (`~/.mcrelay/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".mcrelay"))
}

/// Runtime paths under `~/.mcrelay/`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    Ok(RuntimePaths::under(config_dir()?))
}

// Default value functions for serde.

fn default_root_dir() -> PathBuf {
    PathBuf::from("minecraft-root-dir")
}

fn default_profile() -> String {
    "rcon_markers".to_owned()
}

fn default_observe_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_rcon_port() -> u16 {
    25575
}

fn default_password_env() -> String {
    "MCRELAY_RCON_SECRET".to_owned()
}

fn default_container() -> String {
    "minecraft".to_owned()
}

fn default_reconnect_interval_secs() -> u64 {
    10
}

fn default_token_env() -> String {
    "MCRELAY_DISCORD_TOKEN".to_owned()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_owned()
}

fn default_inbound_poll_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_ref_message_length() -> usize {
    100
}

fn default_max_nickname_length() -> usize {
    10
}
