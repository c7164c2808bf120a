//! Per-client connection task.
//!
//! Each accepted socket gets its own task running a read, parse, execute
//! loop. All commands that arrive in one read are executed in order and
//! their replies are written back with a single flush, so pipelined
//! clients see their replies in request order.
//!
//! The loop ends when the client hangs up, sends `QUIT`, or sends bytes
//! that are not valid RESP. In the last case the client gets one
//! `-ERR Protocol error` reply before the socket is closed.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Maximum number of unparsed bytes held for one client (1 MB)
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    accepted: AtomicU64,
    active: AtomicU64,
    commands: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connections_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("connection closed with a partial command buffered")]
    UnexpectedEof,

    #[error("client buffer exceeded {0} bytes")]
    BufferFull(usize),
}

/// Why the read loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    Hangup,
    Quit,
}

/// State for one connected client.
pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    buffer: BytesMut,
    replies: Vec<u8>,
    parser: RespParser,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();

        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            replies: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            commands,
            stats,
        }
    }

    /// Serves the client until it disconnects.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.serve().await;
        self.stats.closed();

        match &result {
            Ok(Close::Quit) => debug!(client = %self.addr, "Client sent QUIT"),
            Ok(Close::Hangup) => debug!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        result.map(|_| ())
    }

    async fn serve(&mut self) -> Result<Close, ConnectionError> {
        loop {
            let quit = match self.drain_buffer() {
                Ok(quit) => quit,
                Err(e) => {
                    RespValue::error(format!("ERR Protocol error: {}", e))
                        .serialize_into(&mut self.replies);
                    self.flush_replies().await?;
                    return Err(e.into());
                }
            };
            self.flush_replies().await?;
            if quit {
                return Ok(Close::Quit);
            }

            if self.buffer.len() >= MAX_BUFFER_SIZE {
                return Err(ConnectionError::BufferFull(MAX_BUFFER_SIZE));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(Close::Hangup)
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
            self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            trace!(client = %self.addr, bytes = n, "Read data");
        }
    }

    /// Executes every complete command in the buffer, queueing the replies.
    ///
    /// Returns true if one of them was `QUIT`; anything after it is dropped.
    fn drain_buffer(&mut self) -> Result<bool, ParseError> {
        while let Some((command, consumed)) = self.parser.parse(&self.buffer)? {
            self.buffer.advance(consumed);

            let quit = is_quit(&command);
            self.commands
                .execute(command)
                .serialize_into(&mut self.replies);
            self.stats.commands.fetch_add(1, Ordering::Relaxed);

            if quit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if self.replies.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.replies).await?;
        self.stream.flush().await?;
        self.stats
            .bytes_written
            .fetch_add(self.replies.len() as u64, Ordering::Relaxed);
        trace!(client = %self.addr, bytes = self.replies.len(), "Sent replies");

        self.replies.clear();
        Ok(())
    }
}

fn is_quit(command: &RespValue) -> bool {
    match command {
        RespValue::Array(args) => args
            .first()
            .and_then(RespValue::as_str)
            .is_some_and(|name| name.eq_ignore_ascii_case("QUIT")),
        _ => false,
    }
}

/// Serves one client to completion. Errors are logged, not returned.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    if stream.set_nodelay(true).is_err() {
        debug!(client = %addr, "Could not set TCP_NODELAY");
    }
    let _ = ConnectionHandler::new(stream, addr, commands, stats)
        .run()
        .await;
}
