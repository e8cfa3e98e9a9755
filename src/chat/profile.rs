//! Versioned compatibility tables for server log formats.
//!
//! Each [`FormatProfile`] bundles the literal prefixes and status markers one
//! family of server deployments emits. Supporting a new server build means
//! adding a profile here, not touching the classifier.

use regex::Regex;

use super::{ChatError, ServerStatus};

/// `[Server thread/INFO]` prefix emitted by Minecraft 1.19.x and newer.
pub const PREFIX_MINECRAFT_SERVER: &str =
    "[Server thread/INFO] [net.minecraft.server.MinecraftServer/]: ";
/// `[Server thread/INFO]` prefix emitted by Minecraft 1.18.x dedicated servers.
pub const PREFIX_DEDICATED_SERVER: &str =
    "[Server thread/INFO] [net.minecraft.server.dedicated.DedicatedServer/]: ";
/// Tag added in front of unsigned chat on 1.19+ servers.
pub const PREFIX_NOT_SECURE: &str = "[Not Secure] ";

const RCON_STOPPED: &str = r"\[Rcon\] SERVER STOPPED\.\.\.$";
const RCON_STARTED: &str = r"\[Rcon\] SERVER STARTED!!!$";
const VANILLA_STOPPING: &str = r"\[net\.minecraft\.server\.MinecraftServer/\]: Stopping server$";
const MODLAUNCHER_RUNNING: &str = r"ModLauncher running: args \[";
const VOICECHAT_READY: &str = r"\[voicechat/\]: Voice chat server started at port \d+";
const RCON_READY: &str = r"/\]: RCON running on \S+$";

/// A status marker pattern and the status it announces.
#[derive(Debug, Clone)]
pub struct StatusMarker {
    /// Status the server enters when the pattern matches.
    pub status: ServerStatus,
    /// Pattern tested against the raw line.
    pub pattern: Regex,
}

/// Pattern tables for one family of server log formats.
#[derive(Debug, Clone)]
pub struct FormatProfile {
    name: String,
    status_markers: Vec<StatusMarker>,
    gate_prefixes: Vec<String>,
    strip_prefixes: Vec<String>,
}

impl FormatProfile {
    /// Names accepted by [`FormatProfile::by_name`].
    pub const NAMES: [&'static str; 2] = ["rcon_markers", "forge_banners"];

    /// Servers that announce their lifecycle through `[Rcon]` marker lines
    /// written by the management scripts. There is no separate "starting"
    /// state: the server goes straight from stopped to running.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if a marker fails to compile.
    pub fn rcon_markers() -> Result<Self, ChatError> {
        Ok(Self {
            name: "rcon_markers".to_owned(),
            status_markers: vec![
                marker(ServerStatus::Stopped, RCON_STOPPED)?,
                marker(ServerStatus::Running, RCON_STARTED)?,
            ],
            gate_prefixes: default_gate_prefixes(),
            strip_prefixes: default_strip_prefixes(),
        })
    }

    /// Forge servers without marker scripts: the vanilla shutdown line stops
    /// the server, the ModLauncher banner starts it, and either the voice chat
    /// or the RCON readiness banner marks it running. `[Rcon]` markers are
    /// still honoured.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if a marker fails to compile.
    pub fn forge_banners() -> Result<Self, ChatError> {
        Ok(Self {
            name: "forge_banners".to_owned(),
            status_markers: vec![
                marker(ServerStatus::Stopped, RCON_STOPPED)?,
                marker(ServerStatus::Stopped, VANILLA_STOPPING)?,
                marker(ServerStatus::Starting, MODLAUNCHER_RUNNING)?,
                marker(ServerStatus::Running, RCON_STARTED)?,
                marker(ServerStatus::Running, VOICECHAT_READY)?,
                marker(ServerStatus::Running, RCON_READY)?,
            ],
            gate_prefixes: default_gate_prefixes(),
            strip_prefixes: default_strip_prefixes(),
        })
    }

    /// Look a profile up by its configuration name.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownProfile`] for unrecognized names.
    pub fn by_name(name: &str) -> Result<Self, ChatError> {
        match name {
            "rcon_markers" => Self::rcon_markers(),
            "forge_banners" => Self::forge_banners(),
            other => Err(ChatError::UnknownProfile(other.to_owned())),
        }
    }

    /// Profile name as used in configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status markers in match order; first match wins.
    pub fn status_markers(&self) -> &[StatusMarker] {
        &self.status_markers
    }

    /// Prefixes whose presence marks a line as server-said.
    pub fn gate_prefixes(&self) -> &[String] {
        &self.gate_prefixes
    }

    /// Every prefix removed from an eligible line, gate prefixes first.
    pub fn strip_prefixes(&self) -> impl Iterator<Item = &str> {
        self.gate_prefixes
            .iter()
            .chain(self.strip_prefixes.iter())
            .map(String::as_str)
    }

    /// Whether this profile distinguishes "starting" from "stopped".
    pub fn detects_starting(&self) -> bool {
        self.status_markers
            .iter()
            .any(|m| m.status == ServerStatus::Starting)
    }
}

fn marker(status: ServerStatus, pattern: &str) -> Result<StatusMarker, ChatError> {
    Ok(StatusMarker {
        status,
        pattern: Regex::new(pattern)?,
    })
}

fn default_gate_prefixes() -> Vec<String> {
    vec![
        PREFIX_MINECRAFT_SERVER.to_owned(),
        PREFIX_DEDICATED_SERVER.to_owned(),
    ]
}

fn default_strip_prefixes() -> Vec<String> {
    vec![PREFIX_NOT_SECURE.to_owned()]
}
