//! Server lifecycle status tracked from log markers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the Minecraft server as seen in its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// The server shut down.
    Stopped,
    /// The server process is booting but not accepting players yet.
    Starting,
    /// The server is up; chat lines are relayed.
    #[default]
    Running,
}

impl ServerStatus {
    /// Whether chat lines should be surfaced in this state.
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// Initial status from the "assume the server is up" flag.
    pub fn from_running(running: bool) -> Self {
        if running {
            Self::Running
        } else {
            Self::Stopped
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

impl FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            other => Err(format!("unknown server status: {other}")),
        }
    }
}
