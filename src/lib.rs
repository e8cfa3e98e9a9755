//! mcrelay: Minecraft server chat relay for Discord.
//!
//! Tails the server's `logs/latest.log`, turns chat, presence and lifecycle
//! lines into channel messages, and forwards channel messages back into the
//! server console over RCON or a container `rcon-cli` exec.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod chat;
pub mod tail;

pub mod console;
pub mod discord;
pub mod relay;
