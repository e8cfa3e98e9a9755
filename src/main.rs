//! mcrelay CLI entry point.
//!
//! Provides `start` (run the bridge), `watch` (print relayable log lines to
//! stdout) and `check` (validate configuration and report state).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use mcrelay::chat::PumpOutput;
use mcrelay::config::{load_config, runtime_paths, RelayConfig, RuntimePaths};
use mcrelay::console::build_console;
use mcrelay::credentials::load_credentials;
use mcrelay::discord::DiscordClient;
use mcrelay::relay::{build_parser, open_pump, RelaySession};

/// mcrelay: Minecraft server chat relay for Discord.
#[derive(Parser)]
#[command(name = "mcrelay", version, about)]
struct Cli {
    /// Config file (default: ~/.mcrelay/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the relay until interrupted.
    Start,
    /// Print relayable lines from the server log without Discord or console.
    Watch {
        /// Replay the whole existing log instead of starting at its end.
        #[arg(long)]
        from_start: bool,
        /// Stop once the log has no more lines instead of following it.
        #[arg(long)]
        once: bool,
    },
    /// Validate configuration and report paths and vanished players.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = runtime_paths()?;
    let config_path = cli.config.unwrap_or_else(|| paths.config_file.clone());

    match cli.command {
        Command::Start => handle_start(&config_path, &paths).await,
        Command::Watch { from_start, once } => {
            handle_watch(&config_path, &paths, from_start, once).await
        }
        Command::Check => handle_check(&config_path, &paths),
    }
}

async fn handle_start(config_path: &std::path::Path, paths: &RuntimePaths) -> anyhow::Result<()> {
    let _logging_guard = mcrelay::logging::init_production(&paths.logs_dir)?;

    let config = load_config(config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid config at {}", config_path.display()))?;

    let credentials = load_credentials(&paths.env_file)?;
    let token = credentials.require(&config.discord.token_env)?;

    let parser = build_parser(&config, paths)?;
    let (pump, _observer) = open_pump(parser, &config, false)?;
    let console = build_console(&config.console, &credentials)?;
    let transport = DiscordClient::new(&config.discord.api_base, config.discord.channel_id, token)?
        .identify()
        .await
        .context("failed to authenticate with discord")?;

    info!(
        config = %config_path.display(),
        log = %pump.parser().source_path().display(),
        console = console.kind(),
        channel = config.discord.channel_id,
        "relay started"
    );

    let session = RelaySession::new(
        pump,
        console,
        Arc::new(transport),
        &config.relay,
        config.discord.inbound_poll_interval(),
    );
    session.run(shutdown_signal()).await?;
    Ok(())
}

async fn handle_watch(
    config_path: &std::path::Path,
    paths: &RuntimePaths,
    from_start: bool,
    once: bool,
) -> anyhow::Result<()> {
    mcrelay::logging::init_cli();

    let mut config = load_config(config_path)?;
    if once {
        // A single pass reads the file directly.
        config.tail.background = false;
    }
    let parser = build_parser(&config, paths)?;
    let (mut pump, _observer) = open_pump(parser, &config, from_start)?;

    let mut interval = tokio::time::interval(config.relay.poll_interval());
    let stop = shutdown_signal();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            _ = interval.tick() => {
                loop {
                    match pump.next_outward_message() {
                        PumpOutput::Idle => break,
                        PumpOutput::Message(text) => println!("{text}"),
                        PumpOutput::StatusChanged(status) => println!("[server {status}]"),
                    }
                }
                if once {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn handle_check(config_path: &std::path::Path, paths: &RuntimePaths) -> anyhow::Result<()> {
    mcrelay::logging::init_cli();

    let config: RelayConfig = load_config(config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid config at {}", config_path.display()))?;

    let parser = build_parser(&config, paths)?;
    let log_path = parser.source_path();
    let vanished: Vec<&str> = parser.vanish().store().players().collect();

    println!("config:   {}", config_path.display());
    println!(
        "log:      {} ({})",
        log_path.display(),
        if log_path.exists() { "found" } else { "missing" }
    );
    println!("profile:  {}", parser.classifier().profile().name());
    println!("vanish:   {}", parser.vanish().store().path().display());
    println!("vanished: {}", vanished.join(", "));
    println!("config ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
