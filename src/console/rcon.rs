//! Source RCON client.
//!
//! Wire format, all integers little-endian:
//! `length: i32, id: i32, type: i32, body: [u8], 0u8, 0u8`, where `length`
//! counts everything after itself. Authentication failures come back with
//! id `-1`.
//!
//! The connection is dialed lazily and dropped on any failure. The next
//! command redials, at most once per reconnect interval, so a stopped server
//! costs one refused connection per interval instead of a retry storm.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ConsoleError, ConsoleSender};

/// Login request.
pub const SERVERDATA_AUTH: i32 = 3;
/// Login result; shares its value with [`SERVERDATA_EXECCOMMAND`].
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
/// Command request.
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
/// Command output.
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Largest body a client may send (Minecraft rejects longer ones).
pub const MAX_REQUEST_BODY: usize = 1446;
/// Largest packet accepted from the server.
const MAX_RESPONSE_LEN: i32 = 65_536;
/// id, type and the two terminating nulls.
const HEADER_LEN: usize = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    /// Request id echoed by the server.
    pub id: i32,
    /// Packet type.
    pub kind: i32,
    /// Payload text.
    pub body: String,
}

impl RconPacket {
    /// Encode into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Protocol`] if the body is too long to frame.
    pub fn encode(&self) -> Result<Vec<u8>, ConsoleError> {
        let body = self.body.as_bytes();
        let length = body
            .len()
            .checked_add(HEADER_LEN)
            .and_then(|len| i32::try_from(len).ok())
            .ok_or_else(|| ConsoleError::Protocol("packet body too long".to_owned()))?;

        let mut out = Vec::with_capacity(body.len().saturating_add(HEADER_LEN).saturating_add(4));
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0]);
        Ok(out)
    }

    /// Write the packet to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), ConsoleError> {
        writer.write_all(&self.encode()?).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one packet from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Protocol`] for impossible lengths and
    /// [`ConsoleError::Io`] if the stream ends early.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ConsoleError> {
        let length = reader.read_i32_le().await?;
        if !(10..=MAX_RESPONSE_LEN).contains(&length) {
            return Err(ConsoleError::Protocol(format!(
                "invalid packet length {length}"
            )));
        }
        let id = reader.read_i32_le().await?;
        let kind = reader.read_i32_le().await?;

        // Range-checked above, so both conversions succeed.
        let remaining = usize::try_from(length)
            .ok()
            .and_then(|len| len.checked_sub(8))
            .ok_or_else(|| ConsoleError::Protocol(format!("invalid packet length {length}")))?;
        let mut payload = vec![0u8; remaining];
        reader.read_exact(&mut payload).await?;

        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let body = String::from_utf8_lossy(payload.get(..end).unwrap_or_default()).into_owned();

        Ok(Self { id, kind, body })
    }
}

#[derive(Debug, Default)]
struct RconState {
    stream: Option<TcpStream>,
    last_attempt: Option<Instant>,
    next_id: i32,
}

impl RconState {
    fn allocate_id(&mut self) -> i32 {
        // -1 is reserved for auth failures, so ids stay positive.
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        self.next_id
    }
}

/// RCON client with lazy, rate-limited reconnects.
pub struct RconClient {
    addr: String,
    password: String,
    reconnect_interval: Duration,
    state: Mutex<RconState>,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("addr", &self.addr)
            .field("password", &"[REDACTED]")
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}

impl RconClient {
    /// Client for `host:port`. Nothing is dialed until the first command.
    pub fn new(
        host: &str,
        port: u16,
        password: impl Into<String>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            password: password.into(),
            reconnect_interval,
            state: Mutex::new(RconState::default()),
        }
    }

    /// Address this client dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.stream.is_some()
    }

    async fn dial(&self, state: &mut RconState) -> Result<(), ConsoleError> {
        state.stream = None;
        state.last_attempt = Some(Instant::now());

        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ConsoleError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        let id = state.allocate_id();
        let login = RconPacket {
            id,
            kind: SERVERDATA_AUTH,
            body: self.password.clone(),
        };
        with_timeout(async {
            login.write_to(&mut stream).await?;
            // Some servers send an empty RESPONSE_VALUE before the auth result.
            loop {
                let reply = RconPacket::read_from(&mut stream).await?;
                if reply.kind != SERVERDATA_AUTH_RESPONSE {
                    continue;
                }
                if reply.id == -1 {
                    return Err(ConsoleError::Auth);
                }
                if reply.id != id {
                    return Err(ConsoleError::Protocol(format!(
                        "auth response id {} does not match request {id}",
                        reply.id
                    )));
                }
                return Ok(());
            }
        })
        .await?;

        info!(addr = %self.addr, "rcon connected");
        state.stream = Some(stream);
        Ok(())
    }

    async fn ensure_connected(&self, state: &mut RconState) -> Result<(), ConsoleError> {
        if state.stream.is_some() {
            return Ok(());
        }
        let due = match state.last_attempt {
            Some(at) => at.elapsed() >= self.reconnect_interval,
            None => true,
        };
        if !due {
            return Err(ConsoleError::NotConnected);
        }
        self.dial(state).await
    }
}

#[async_trait]
impl ConsoleSender for RconClient {
    async fn send(&self, command: &str) -> Result<String, ConsoleError> {
        if command.len() > MAX_REQUEST_BODY {
            return Err(ConsoleError::Protocol(format!(
                "command is {} bytes, limit is {MAX_REQUEST_BODY}",
                command.len()
            )));
        }

        let mut state = self.state.lock().await;
        if let Err(e) = self.ensure_connected(&mut state).await {
            debug!(addr = %self.addr, error = %e, "rcon unavailable");
            return Err(e);
        }

        let id = state.allocate_id();
        let Some(stream) = state.stream.as_mut() else {
            return Err(ConsoleError::NotConnected);
        };

        let request = RconPacket {
            id,
            kind: SERVERDATA_EXECCOMMAND,
            body: command.to_owned(),
        };
        let result = with_timeout(async {
            request.write_to(stream).await?;
            loop {
                let reply = RconPacket::read_from(stream).await?;
                if reply.id == id && reply.kind == SERVERDATA_RESPONSE_VALUE {
                    return Ok(reply.body);
                }
                debug!(id = reply.id, kind = reply.kind, "skipping unrelated rcon packet");
            }
        })
        .await;

        if let Err(e) = &result {
            warn!(addr = %self.addr, error = %e, "rcon command failed, dropping connection");
            state.stream = None;
        }
        result
    }

    async fn reconnect(&self) -> Result<(), ConsoleError> {
        let mut state = self.state.lock().await;
        let result = self.dial(&mut state).await;
        if let Err(e) = &result {
            warn!(addr = %self.addr, error = %e, "rcon reconnect failed");
        }
        result
    }

    fn kind(&self) -> &'static str {
        "rcon"
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, ConsoleError>>,
) -> Result<T, ConsoleError> {
    tokio::time::timeout(REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| ConsoleError::Timeout {
            seconds: REQUEST_TIMEOUT.as_secs(),
        })?
}
