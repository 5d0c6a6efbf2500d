//! Listener loop.
//!
//! mio polls the TCP listener (and the optional Unix socket listener);
//! every accepted client gets a blocking session thread.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::net::{SocketAddr, TcpListener};
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::net::TcpListener as MioTcpListener;
#[cfg(unix)]
use mio::net::UnixListener as MioUnixListener;
use mio::{Events, Interest, Poll, Token};

use super::connection::{Connection, Stream};
use super::session::{ListenerKind, Session, SessionInfo};
use crate::device::{ControlContext, DeviceManager};

const TCP_TOKEN: Token = Token(0);
#[cfg(unix)]
const UNIX_TOKEN: Token = Token(1);
const EVENTS_CAPACITY: usize = 128;
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Also listen on this Unix domain socket
    #[cfg(unix)]
    pub unix_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:36000".to_string(),
            #[cfg(unix)]
            unix_path: None,
        }
    }
}

#[derive(Default)]
struct ListenerStats {
    opened: AtomicU64,
    total: AtomicU64,
    requests: AtomicU64,
}

/// State shared by the listener and every session.
pub struct ServerContext {
    manager: DeviceManager,
    started: Instant,
    tcp: ListenerStats,
    unix: ListenerStats,
    sessions: Mutex<HashMap<u64, Arc<SessionInfo>>>,
    next_session: AtomicU64,
}

impl ServerContext {
    pub fn new(manager: DeviceManager) -> Self {
        Self {
            manager,
            started: Instant::now(),
            tcp: ListenerStats::default(),
            unix: ListenerStats::default(),
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    fn stats(&self, kind: ListenerKind) -> &ListenerStats {
        match kind {
            ListenerKind::Tcp => &self.tcp,
            ListenerKind::Unix => &self.unix,
        }
    }

    pub(crate) fn count_request(&self, kind: ListenerKind) {
        self.stats(kind).requests.fetch_add(1, Ordering::Relaxed);
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<SessionInfo>>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn add_session(&self, kind: ListenerKind, stream: &Stream) -> io::Result<Arc<SessionInfo>> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let info = Arc::new(SessionInfo::new(id, kind, stream.try_clone()?));
        self.sessions().insert(id, Arc::clone(&info));
        let stats = self.stats(kind);
        stats.opened.fetch_add(1, Ordering::Relaxed);
        stats.total.fetch_add(1, Ordering::Relaxed);
        Ok(info)
    }

    pub(crate) fn remove_session(&self, id: u64) {
        if let Some(info) = self.sessions().remove(&id) {
            self.stats(info.kind).opened.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    fn close_sessions(&self) {
        for info in self.sessions().values() {
            info.close();
        }
    }
}

impl ControlContext for ServerContext {
    fn discovery_text(&self) -> &str {
        self.manager.discovery_text()
    }

    fn stats_text(&self) -> String {
        let mut out = format!("UPTIME:{}\n", self.started.elapsed().as_secs());
        for kind in [ListenerKind::Tcp, ListenerKind::Unix] {
            let stats = self.stats(kind);
            let _ = writeln!(
                out,
                "{}:{}:{}:{}",
                kind,
                stats.opened.load(Ordering::Relaxed),
                stats.total.load(Ordering::Relaxed),
                stats.requests.load(Ordering::Relaxed)
            );
        }
        out.push_str("EOKS");
        out
    }

    fn dev_status_text(&self) -> String {
        self.manager.status_text()
    }

    fn sessions_text(&self) -> String {
        let sessions = self.sessions();
        let mut ids: Vec<&u64> = sessions.keys().collect();
        ids.sort();
        let mut out = String::new();
        for id in ids {
            let _ = writeln!(out, "{}", sessions[id].status_line());
        }
        out.push_str("EORS");
        out
    }

    fn subscribe(&self, session_id: u64, channel: u32) {
        if let Some(info) = self.sessions().get(&session_id) {
            info.subscribe(channel);
        }
    }

    fn broadcast(&self, channel: u32, payload: &[u8]) {
        let subscribers: Vec<Arc<SessionInfo>> = self
            .sessions()
            .values()
            .filter(|info| info.is_subscribed(channel))
            .cloned()
            .collect();
        for info in subscribers {
            if let Err(e) = info.send(payload) {
                log::warn!("broadcast to session {} failed: {}", info.id, e);
            }
        }
    }
}

pub struct Server {
    poll: Poll,
    tcp: MioTcpListener,
    #[cfg(unix)]
    unix: Option<(MioUnixListener, PathBuf)>,
    context: Arc<ServerContext>,
    stop: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(config: &ServerConfig, manager: DeviceManager) -> io::Result<Self> {
        let poll = Poll::new()?;

        let listener = TcpListener::bind(&config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let mut tcp = MioTcpListener::from_std(listener);
        poll.registry().register(&mut tcp, TCP_TOKEN, Interest::READABLE)?;

        #[cfg(unix)]
        let unix = match &config.unix_path {
            Some(path) => {
                // Stale socket file from a previous run
                let _ = std::fs::remove_file(path);
                let mut listener = MioUnixListener::bind(path)?;
                poll.registry()
                    .register(&mut listener, UNIX_TOKEN, Interest::READABLE)?;
                Some((listener, path.clone()))
            }
            None => None,
        };

        Ok(Self {
            poll,
            tcp,
            #[cfg(unix)]
            unix,
            context: Arc::new(ServerContext::new(manager)),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Run until the stop flag is raised.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while !self.stop.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                match event.token() {
                    TCP_TOKEN => self.accept_tcp()?,
                    #[cfg(unix)]
                    UNIX_TOKEN => self.accept_unix()?,
                    _ => {}
                }
            }
        }

        self.context.close_sessions();
        #[cfg(unix)]
        if let Some((_, path)) = &self.unix {
            let _ = std::fs::remove_file(path);
        }
        log::info!("server stopped");
        Ok(())
    }

    fn accept_tcp(&mut self) -> io::Result<()> {
        loop {
            match self.tcp.accept() {
                Ok((stream, addr)) => {
                    let stream = into_std_tcp(stream);
                    stream.set_nonblocking(false)?;
                    log::debug!("accepted {}", addr);
                    self.start_session(ListenerKind::Tcp, Stream::Tcp(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    #[cfg(unix)]
    fn accept_unix(&mut self) -> io::Result<()> {
        let Some((listener, _)) = &self.unix else {
            return Ok(());
        };
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    let stream = into_std_unix(stream);
                    stream.set_nonblocking(false)?;
                    self.start_session(ListenerKind::Unix, Stream::Unix(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn start_session(&self, kind: ListenerKind, stream: Stream) {
        let started = self.context.add_session(kind, &stream).and_then(|info| {
            let conn = Connection::new(stream)?;
            let session = Session::new(conn, Arc::clone(&info), Arc::clone(&self.context));
            thread::Builder::new()
                .name(format!("session-{}", info.id))
                .spawn(move || session.run())
                .map(|_| ())
                .map_err(|e| {
                    self.context.remove_session(info.id);
                    e
                })
        });
        if let Err(e) = started {
            log::error!("failed to start {} session: {}", kind, e);
        }
    }

    /// Run the listener on its own thread.
    pub fn spawn(mut self) -> io::Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let stop = Arc::clone(&self.stop);
        let context = Arc::clone(&self.context);
        let thread = thread::Builder::new()
            .name("devlink-listener".to_string())
            .spawn(move || self.run())?;
        Ok(ServerHandle {
            local_addr,
            stop,
            context,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
fn into_std_tcp(stream: mio::net::TcpStream) -> std::net::TcpStream {
    use std::os::unix::io::{FromRawFd, IntoRawFd};
    // SAFETY: ownership of the descriptor moves from the mio stream
    unsafe { std::net::TcpStream::from_raw_fd(stream.into_raw_fd()) }
}

#[cfg(windows)]
fn into_std_tcp(stream: mio::net::TcpStream) -> std::net::TcpStream {
    use std::os::windows::io::{FromRawSocket, IntoRawSocket};
    // SAFETY: ownership of the socket moves from the mio stream
    unsafe { std::net::TcpStream::from_raw_socket(stream.into_raw_socket()) }
}

#[cfg(unix)]
fn into_std_unix(stream: mio::net::UnixStream) -> std::os::unix::net::UnixStream {
    use std::os::unix::io::{FromRawFd, IntoRawFd};
    // SAFETY: ownership of the descriptor moves from the mio stream
    unsafe { std::os::unix::net::UnixStream::from_raw_fd(stream.into_raw_fd()) }
}

/// A server running in the background.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    context: Arc<ServerContext>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Stop the listener, close every session and wait for the loop.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "listener thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
