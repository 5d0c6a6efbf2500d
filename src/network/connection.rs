//! Blocking connection with a growable read buffer.
//!
//! Bytes received past what a caller asked for stay buffered for the
//! next read, so marker scans (`recv_until`) and exact reads can be mixed
//! freely on one stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Size of one socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A TCP or Unix domain byte stream.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }

    /// Peer address for logs and session listings.
    pub fn peer(&self) -> String {
        match self {
            Stream::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".to_string()),
            #[cfg(unix)]
            Stream::Unix(s) => s
                .peer_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unix".to_string()),
        }
    }

    /// Resize the kernel receive buffer. Errors are ignored, not every
    /// platform allows it.
    pub fn set_recv_buffer_size(&self, bytes: usize) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = match self {
                Stream::Tcp(s) => s.as_raw_fd(),
                Stream::Unix(s) => s.as_raw_fd(),
            };
            let optval = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
            // SAFETY: fd is a live socket owned by self, optval outlives the call
            unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }
        #[cfg(not(unix))]
        let _ = bytes;
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// Write all of `data`, a zero-byte write meaning the peer is gone.
pub fn send_all<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => return Err(Error::ConnectionBroken),
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub struct Connection {
    stream: Stream,
    read_buffer: Vec<u8>,
    read_pos: usize,
}

impl Connection {
    pub fn new(stream: Stream) -> io::Result<Self> {
        if let Stream::Tcp(s) = &stream {
            // Calls are small request/reply exchanges
            s.set_nodelay(true)?;
        }
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            read_pos: 0,
        })
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Bytes received but not consumed yet.
    #[inline(always)]
    pub fn buffered(&self) -> usize {
        self.read_buffer.len() - self.read_pos
    }

    /// Read once from the socket into the buffer.
    fn fill(&mut self) -> Result<usize> {
        if self.read_pos > 0 {
            self.read_buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        let start = self.read_buffer.len();
        self.read_buffer.resize(start + READ_CHUNK_SIZE, 0);
        let result = loop {
            match self.stream.read(&mut self.read_buffer[start..]) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        match result {
            Ok(0) => {
                self.read_buffer.truncate(start);
                Err(Error::ConnectionBroken)
            }
            Ok(n) => {
                self.read_buffer.truncate(start + n);
                log::trace!("received {} bytes", n);
                Ok(n)
            }
            Err(e) => {
                self.read_buffer.truncate(start);
                Err(e.into())
            }
        }
    }

    fn consume(&mut self, n: usize) -> &[u8] {
        let start = self.read_pos;
        self.read_pos += n;
        &self.read_buffer[start..start + n]
    }

    pub fn recv_into(&mut self, buf: &mut [u8]) -> Result<()> {
        while self.buffered() < buf.len() {
            self.fill()?;
        }
        let n = buf.len();
        buf.copy_from_slice(self.consume(n));
        Ok(())
    }

    pub fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        while self.buffered() < n {
            self.fill()?;
        }
        Ok(self.consume(n).to_vec())
    }

    pub fn recv_u32_be(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.recv_into(&mut raw)?;
        Ok(u32::from_be_bytes(raw))
    }

    /// `recv_exact` bounded by `timeout`.
    pub fn recv_exact_within(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        while self.buffered() < n {
            self.fill_before(deadline, timeout, "reply")?;
        }
        Ok(self.consume(n).to_vec())
    }

    /// Bytes up to `marker`, marker consumed but not returned. On timeout
    /// the partial data stays buffered.
    pub fn recv_until(&mut self, marker: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let label = String::from_utf8_lossy(marker).into_owned();
        let mut scanned: usize = 0;
        loop {
            let pending = &self.read_buffer[self.read_pos..];
            let from = scanned.saturating_sub(marker.len().saturating_sub(1));
            if let Some(pos) = find(&pending[from..], marker) {
                let end = from + pos;
                let data = pending[..end].to_vec();
                self.read_pos += end + marker.len();
                return Ok(data);
            }
            scanned = pending.len();
            self.fill_before(deadline, timeout, &label)?;
        }
    }

    fn fill_before(&mut self, deadline: Instant, timeout: Duration, label: &str) -> Result<usize> {
        let timed_out = || Error::Timeout {
            marker: label.to_string(),
            timeout,
        };
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or_else(timed_out)?;

        self.stream.set_read_timeout(Some(remaining))?;
        let result = self.fill();
        self.stream.set_read_timeout(None)?;

        match result {
            Err(Error::Io(e)) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(timed_out())
            }
            other => other,
        }
    }

    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        log::trace!("sending {} bytes", data.len());
        send_all(&mut self.stream, data)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
