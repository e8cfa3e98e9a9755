//! Pulls raw lines from a [`LineSource`] and yields what the relay should
//! act on next.

use crate::tail::{LineSource, TailError, TailReader};

use super::{ChatEvent, ChatParser, ServerStatus};

/// Result of one pump step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutput {
    /// The source has nothing new.
    Idle,
    /// A line to relay.
    Message(String),
    /// The server changed lifecycle state.
    StatusChanged(ServerStatus),
}

/// Drives a [`ChatParser`] from a line source.
#[derive(Debug)]
pub struct MessagePump<S> {
    source: S,
    parser: ChatParser,
}

impl MessagePump<TailReader> {
    /// Tail the parser's log from its current end.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::FileNotFound`] if the server has no log yet.
    pub fn open(parser: ChatParser) -> Result<Self, TailError> {
        let reader = TailReader::open(parser.source_path())?;
        Ok(Self::new(reader, parser))
    }
}

impl<S: LineSource> MessagePump<S> {
    /// Pump over an arbitrary line source.
    pub fn new(source: S, parser: ChatParser) -> Self {
        Self { source, parser }
    }

    /// The parser state.
    pub fn parser(&self) -> &ChatParser {
        &self.parser
    }

    /// The underlying line source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Consume lines until one produces a message or a status change.
    ///
    /// Suppressed and unrecognized lines are skipped. Returns
    /// [`PumpOutput::Idle`] once the source runs dry.
    pub fn next_outward_message(&mut self) -> PumpOutput {
        while let Some(line) = self.source.next_line() {
            let event = self.parser.parse_line(&line);
            if let ChatEvent::ServerStatusChanged(status) = event {
                return PumpOutput::StatusChanged(status);
            }
            if let Some(text) = event.outward_text() {
                return PumpOutput::Message(text);
            }
        }
        PumpOutput::Idle
    }
}
