//! Server console transports.
//!
//! Everything the relay sends into the game goes through [`ConsoleSender`]:
//! chat from Discord as `/say`, and the few query commands the channel can
//! run. Two transports ship: Source RCON over TCP and `rcon-cli` executed
//! inside the server's Docker container.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConsoleConfig, ConsoleKind};
use crate::credentials::Credentials;

pub mod docker;
pub mod rcon;

pub use docker::DockerConsole;
pub use rcon::RconClient;

/// Errors raised by console transports.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// No live connection and a reconnect is not due yet.
    #[error("console is not connected")]
    NotConnected,
    /// TCP connection to the RCON port failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address dialed.
        addr: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The server rejected the RCON password.
    #[error("rcon authentication failed")]
    Auth,
    /// The peer sent something that is not a valid RCON packet.
    #[error("rcon protocol error: {0}")]
    Protocol(String),
    /// Read or write on an established connection failed.
    #[error("console i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// The server did not answer in time.
    #[error("console did not answer within {seconds}s")]
    Timeout {
        /// Time waited.
        seconds: u64,
    },
    /// The Docker daemon call failed.
    #[error("docker operation failed: {0}")]
    Infrastructure(String),
    /// `rcon-cli` exited with a failure status.
    #[error("console command exited with code {code}: {output}")]
    Exec {
        /// Process exit code.
        code: i64,
        /// Captured output.
        output: String,
    },
}

/// Sends commands into the server console.
#[async_trait]
pub trait ConsoleSender: Send + Sync {
    /// Run one console command and return its output.
    async fn send(&self, command: &str) -> Result<String, ConsoleError>;

    /// Drop any existing connection and establish a fresh one.
    async fn reconnect(&self) -> Result<(), ConsoleError>;

    /// Broadcast `message` to every player.
    async fn say(&self, message: &str) -> Result<String, ConsoleError> {
        self.send(&format!("/say {message}")).await
    }

    /// Transport name for logs.
    fn kind(&self) -> &'static str;
}

/// Build the transport selected in `config`.
///
/// RCON does not dial until first use, so this succeeds even while the
/// server is down.
///
/// # Errors
///
/// Returns an error if the RCON password is missing or the Docker daemon
/// cannot be reached.
pub fn build_console(
    config: &ConsoleConfig,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn ConsoleSender>> {
    match config.kind {
        ConsoleKind::Rcon => {
            let password = credentials.require(&config.password_env)?;
            Ok(Arc::new(RconClient::new(
                &config.host,
                config.port,
                password,
                config.reconnect_interval(),
            )))
        }
        ConsoleKind::Docker => Ok(Arc::new(DockerConsole::new(&config.container)?)),
    }
}
