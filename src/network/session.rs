//! Server session: one connected client, served on its own thread.
//!
//! Commands are handled strictly one after the other. Replies and
//! broadcast events share the session writer, so they never interleave.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::connection::{send_all, Connection, Stream};
use super::server::ServerContext;
use crate::device::{control, decode_arguments, encode_reply, CommandStream};
use crate::error::{Error, Result};
use crate::protocol::{Command, CommandHeader, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Tcp,
    Unix,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListenerKind::Tcp => "TCP",
            ListenerKind::Unix => "UNIX",
        })
    }
}

/// Shared view of a session, reachable from other sessions.
pub struct SessionInfo {
    pub id: u64,
    pub kind: ListenerKind,
    pub peer: String,
    started: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    writer: Mutex<Stream>,
    channels: Mutex<HashSet<u32>>,
}

impl SessionInfo {
    pub fn new(id: u64, kind: ListenerKind, writer: Stream) -> Self {
        Self {
            id,
            kind,
            peer: writer.peer(),
            started: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            writer: Mutex::new(writer),
            channels: Mutex::new(HashSet::new()),
        }
    }

    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        send_all(&mut *writer, bytes)
    }

    pub fn subscribe(&self, channel: u32) {
        self.channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(channel);
    }

    pub fn is_subscribed(&self, channel: u32) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&channel)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// `<id>:<TCP|UNIX>:<peer>:<requests>:<errors>:<uptime>`
    pub fn status_line(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.id,
            self.kind,
            self.peer,
            self.requests(),
            self.errors(),
            self.started.elapsed().as_secs()
        )
    }

    /// Unblock the session thread.
    pub fn close(&self) {
        let writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let _ = writer.shutdown();
    }
}

pub struct Session {
    conn: Connection,
    info: Arc<SessionInfo>,
    ctx: Arc<ServerContext>,
}

impl Session {
    pub fn new(conn: Connection, info: Arc<SessionInfo>, ctx: Arc<ServerContext>) -> Self {
        Self { conn, info, ctx }
    }

    /// Serve commands until the client leaves or the stream breaks.
    pub fn run(mut self) {
        log::info!("session {} opened ({} {})", self.info.id, self.info.kind, self.info.peer);
        loop {
            let command = match self.read_command() {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("session {}: {}", self.info.id, e);
                    break;
                }
            };
            self.info.requests.fetch_add(1, Ordering::Relaxed);
            self.ctx.count_request(self.info.kind);

            if let Err(e) = self.handle(&command) {
                log::warn!("session {} closed: {}", self.info.id, e);
                break;
            }
        }
        self.ctx.remove_session(self.info.id);
        log::info!("session {} closed", self.info.id);
    }

    /// `None` once the client closed the stream.
    fn read_command(&mut self) -> Result<Option<Command>> {
        let mut raw = [0u8; HEADER_SIZE];
        match self.conn.recv_into(&mut raw) {
            Ok(()) => {}
            Err(Error::ConnectionBroken) => return Ok(None),
            Err(e) => return Err(e),
        }
        let header = CommandHeader::from_bytes(&raw)?;
        let payload = self.conn.recv_exact(header.payload_size as usize)?;
        log::debug!(
            "session {}: device {} operation {} payload {} bytes",
            self.info.id,
            header.device_id,
            header.operation_id,
            payload.len()
        );
        Ok(Some(Command { header, payload }))
    }

    /// Per-call errors are logged and the session goes on; only stream
    /// failures are returned.
    fn handle(&mut self, command: &Command) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let unknown = Error::UnknownCommand {
            device_id: command.device_id(),
            operation_id: command.operation_id(),
        };

        let Some(device) = ctx.manager().device(command.device_id()) else {
            log::error!("{}", unknown);
            self.info.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        let descriptor = device.descriptor();
        let (Some(op), Some(layout)) = (
            descriptor.operation(command.operation_id()),
            device.layout(command.operation_id()),
        ) else {
            log::error!("{}: {}", descriptor.tag, unknown);
            self.info.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let name = descriptor.name.as_str();
        let reply = match device.lock() {
            None => decode_arguments(name, op, layout, &command.payload, self, |_, n| n)
                .and_then(|args| control::execute(op, &args, self.info.id, ctx.as_ref())),
            Some(mut dev) => {
                decode_arguments(name, op, layout, &command.payload, self, |args, n| {
                    dev.accept_buffer(op, args, n)
                })
                .and_then(|args| dev.execute(op, &args))
            }
        };

        match reply.and_then(|reply| encode_reply(name, op, reply)) {
            Ok(Some(bytes)) => self.info.send(&bytes),
            Ok(None) => Ok(()),
            Err(e @ (Error::Io(_) | Error::ConnectionBroken)) => Err(e),
            Err(e) => {
                self.info.errors.fetch_add(1, Ordering::Relaxed);
                match e {
                    Error::InvalidPayloadSize { .. }
                    | Error::BufferReload { .. }
                    | Error::VectorReceive { .. }
                    | Error::ArrayExtract { .. }
                    | Error::Device { .. } => log::error!("{}", e),
                    other => log::error!("[{} - {}] {}", name, op.name, other),
                }
                Ok(())
            }
        }
    }
}

impl CommandStream for Session {
    fn load_buffer(&mut self, len: usize) -> Result<Vec<u8>> {
        self.conn.recv_exact(len)
    }

    fn handshake(&mut self, count: u32) -> Result<()> {
        self.info.send(&count.to_be_bytes())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.info.send(bytes)
    }
}
