//! Per-session chat parser: classifier + vanish machine + current status.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ChatError, ChatEvent, FormatProfile, LineClassifier, ServerStatus, VanishHandler};

/// Turns raw log lines into [`ChatEvent`]s for one server.
#[derive(Debug)]
pub struct ChatParser {
    log_path: PathBuf,
    classifier: LineClassifier,
    vanish: VanishHandler,
    status: ServerStatus,
}

impl ChatParser {
    /// Parser for the server rooted at `server_root`, using the default
    /// `rcon_markers` profile.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if the profile fails to compile.
    pub fn new(
        server_root: impl AsRef<Path>,
        vanish: VanishHandler,
        initial_status: ServerStatus,
    ) -> Result<Self, ChatError> {
        let classifier = LineClassifier::new(FormatProfile::rcon_markers()?)?;
        Ok(Self::with_classifier(
            server_root,
            classifier,
            vanish,
            initial_status,
        ))
    }

    /// Parser with an explicit classifier.
    pub fn with_classifier(
        server_root: impl AsRef<Path>,
        classifier: LineClassifier,
        vanish: VanishHandler,
        initial_status: ServerStatus,
    ) -> Self {
        Self {
            log_path: Self::log_path(server_root),
            classifier,
            vanish,
            status: initial_status,
        }
    }

    /// Location of the live log under a server root.
    pub fn log_path(server_root: impl AsRef<Path>) -> PathBuf {
        server_root.as_ref().join("logs").join("latest.log")
    }

    /// The log this parser is meant to read.
    pub fn source_path(&self) -> &Path {
        &self.log_path
    }

    /// Last status seen in the log.
    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// The vanish machine.
    pub fn vanish(&self) -> &VanishHandler {
        &self.vanish
    }

    /// The classifier.
    pub fn classifier(&self) -> &LineClassifier {
        &self.classifier
    }

    /// Classify one raw line and apply the vanish rules.
    ///
    /// Every matched status marker is reported, including one that repeats
    /// the current status.
    pub fn parse_line(&mut self, raw_line: &str) -> ChatEvent {
        match self.classifier.classify(raw_line, self.status) {
            ChatEvent::ServerStatusChanged(status) => {
                if status == self.status {
                    debug!(%status, "status marker repeats current status");
                } else {
                    info!(from = %self.status, to = %status, "server status changed");
                }
                self.status = status;
                ChatEvent::ServerStatusChanged(status)
            }
            ChatEvent::PlayerMessage { text, username } => {
                self.vanish.dispose(&text, username.as_deref())
            }
            other => other,
        }
    }
}
