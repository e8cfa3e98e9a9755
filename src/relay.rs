//! The relay session: log pump to Discord, Discord to the server console.
//!
//! [`RelaySession`] owns every collaborator explicitly. The outbound side
//! takes one pump step per tick; the inbound side polls the channel on its
//! own, slower interval. Transport failures are logged and the loops keep
//! going.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::chat::{
    ChatParser, FormatProfile, LineClassifier, MessagePump, PumpOutput, ServerStatus,
    VanishHandler,
};
use crate::config::{RelayConfig, RelayMessages, RelaySettings, RuntimePaths};
use crate::console::ConsoleSender;
use crate::discord::{ChatTransport, DiscordError, InboundMessage, MessageFormat};
use crate::tail::observer::LineObserver;
use crate::tail::{LineSource, TailReader};

/// Commands the channel understands.
pub const SUPPORTED_COMMANDS: &str = "/info, /list, /tps";

/// Line source used by the binary: the reader itself or an observer queue.
pub type DynLineSource = Box<dyn LineSource + Send>;

/// Build the chat parser described by `config`.
///
/// # Errors
///
/// Returns an error for an unknown profile name.
pub fn build_parser(config: &RelayConfig, paths: &RuntimePaths) -> anyhow::Result<ChatParser> {
    let classifier = LineClassifier::new(FormatProfile::by_name(&config.server.profile)?)?;
    let vanish = VanishHandler::master_perki(config.vanish_file(paths))?;
    Ok(ChatParser::with_classifier(
        &config.server.root_dir,
        classifier,
        vanish,
        ServerStatus::from_running(config.server.assume_running),
    ))
}

/// Open the server log and wrap it in a pump.
///
/// With `from_start` the whole existing log is replayed. When the config
/// asks for a background observer it is spawned on the current runtime and
/// returned; dropping it stops the observer.
///
/// # Errors
///
/// Returns an error if the log file does not exist.
pub fn open_pump(
    parser: ChatParser,
    config: &RelayConfig,
    from_start: bool,
) -> anyhow::Result<(MessagePump<DynLineSource>, Option<LineObserver>)> {
    let mut reader = TailReader::open(parser.source_path())?;
    if from_start {
        reader.set_offset(0);
        reader.reset_mtime_cache();
    }

    if config.tail.background {
        let (observer, lines) = LineObserver::spawn(reader, config.tail.observer_config());
        Ok((MessagePump::new(Box::new(lines), parser), Some(observer)))
    } else {
        Ok((MessagePump::new(Box::new(reader), parser), None))
    }
}

/// Wiring for one running bridge.
pub struct RelaySession<S> {
    pump: MessagePump<S>,
    console: Arc<dyn ConsoleSender>,
    transport: Arc<dyn ChatTransport>,
    messages: RelayMessages,
    format: MessageFormat,
    outbound_interval: Duration,
    inbound_interval: Duration,
}

impl<S: LineSource> RelaySession<S> {
    /// Assemble a session.
    pub fn new(
        pump: MessagePump<S>,
        console: Arc<dyn ConsoleSender>,
        transport: Arc<dyn ChatTransport>,
        settings: &RelaySettings,
        inbound_interval: Duration,
    ) -> Self {
        Self {
            pump,
            console,
            transport,
            messages: settings.messages.clone(),
            format: MessageFormat::from_settings(settings),
            outbound_interval: settings.poll_interval(),
            inbound_interval,
        }
    }

    /// The message pump.
    pub fn pump(&self) -> &MessagePump<S> {
        &self.pump
    }

    /// Announce the relay in game and in the channel.
    ///
    /// An unreachable console is logged, not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel announcement fails.
    pub async fn start(&self) -> Result<(), DiscordError> {
        if let Err(e) = self.console.say(&self.messages.bot_joined_game).await {
            warn!(console = self.console.kind(), error = %e, "failed to announce relay in game");
        }
        self.transport.send(&self.messages.bot_joined_chat).await
    }

    /// Take one pump step and act on it.
    ///
    /// # Errors
    ///
    /// Returns an error if posting to the channel fails. The pump step is
    /// consumed either way.
    pub async fn tick_outbound(&mut self) -> Result<PumpOutput, DiscordError> {
        let output = self.pump.next_outward_message();
        match &output {
            PumpOutput::Idle => {}
            PumpOutput::Message(text) => {
                info!(message = %text, "relaying game message");
                self.transport.send(text).await?;
            }
            PumpOutput::StatusChanged(ServerStatus::Running) => {
                info!("server started, reconnecting console");
                self.transport.send(&self.messages.server_started).await?;
                if let Err(e) = self.console.reconnect().await {
                    warn!(console = self.console.kind(), error = %e, "console reconnect failed");
                }
            }
            PumpOutput::StatusChanged(ServerStatus::Stopped) => {
                info!("server stopped");
                self.transport.send(&self.messages.server_stopped).await?;
            }
            PumpOutput::StatusChanged(ServerStatus::Starting) => {
                info!("server starting");
            }
        }
        Ok(output)
    }

    /// Fetch new channel messages and handle each.
    ///
    /// A failed reply is logged and the rest of the batch still runs.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching fails.
    pub async fn poll_inbound(&self) -> Result<usize, DiscordError> {
        let messages = self.transport.fetch_new().await?;
        for message in &messages {
            if let Err(e) = self.handle_inbound(message).await {
                warn!(id = message.id, error = %e, "failed to handle channel message");
            }
        }
        Ok(messages.len())
    }

    /// Run a channel command or forward a message into the game.
    ///
    /// # Errors
    ///
    /// Returns an error if a reply to the channel fails.
    pub async fn handle_inbound(&self, message: &InboundMessage) -> Result<(), DiscordError> {
        if message.is_command() {
            return self.handle_command(message).await;
        }

        let text = self.format.render(message);
        info!(message = %text, "relaying channel message");
        if let Err(e) = self.console.say(&text).await {
            warn!(console = self.console.kind(), error = %e, "failed to relay message into game");
            self.transport
                .send(&self.messages.console_unavailable)
                .await?;
        }
        Ok(())
    }

    async fn handle_command(&self, message: &InboundMessage) -> Result<(), DiscordError> {
        let command = message.content.split_whitespace().next().unwrap_or_default();
        info!(command, author = %message.author, "channel command received");

        let reply = match command {
            "/list" => match self.console.send("/list").await {
                Ok(players) => players.trim_end().trim_end_matches(':').to_owned(),
                Err(e) => {
                    warn!(error = %e, "/list failed");
                    self.messages.list_failed.clone()
                }
            },
            "/tps" => match self.console.send("/forge tps").await {
                Ok(tps) => tps.trim().to_owned(),
                Err(e) => {
                    warn!(error = %e, "/tps failed");
                    self.messages.tps_failed.clone()
                }
            },
            "/info" => format!("{}{SUPPORTED_COMMANDS}", self.messages.available_commands),
            _ => format!("{}{SUPPORTED_COMMANDS}", self.messages.unknown_command),
        };
        self.transport.send(&reply).await
    }

    /// Say goodbye in the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel post fails.
    pub async fn shutdown(&self) -> Result<(), DiscordError> {
        self.transport.send(&self.messages.bot_left_chat).await
    }

    /// Run both directions until `stop` resolves, then say goodbye.
    ///
    /// # Errors
    ///
    /// Returns an error if the opening announcement fails.
    pub async fn run(mut self, stop: impl Future<Output = ()>) -> Result<(), DiscordError> {
        self.start().await?;

        let mut outbound = tokio::time::interval(self.outbound_interval);
        outbound.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound = tokio::time::interval(self.inbound_interval);
        inbound.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                () = &mut stop => break,
                _ = outbound.tick() => {
                    if let Err(e) = self.tick_outbound().await {
                        warn!(error = %e, "outbound relay step failed");
                    }
                }
                _ = inbound.tick() => {
                    if let Err(e) = self.poll_inbound().await {
                        warn!(error = %e, "inbound relay poll failed");
                    }
                }
            }
        }

        info!("relay stopping");
        if let Err(e) = self.shutdown().await {
            warn!(error = %e, "failed to announce relay shutdown");
        }
        Ok(())
    }
}
