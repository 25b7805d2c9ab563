//! Byte-stream transport to the firmware server.
//!
//! # Design
//! `Connection` models a socket the way device network stacks expose it:
//! `read` returning `Ok(0)` means "nothing available yet", and liveness is a
//! separate `connected` predicate. `BufferedConnection` layers line reading
//! on top for the header phase and hands any bytes it over-read to the body
//! phase, so no body byte is lost at the header/body boundary.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::PullConfig;
use crate::error::PullError;
use crate::stall::Watchdog;

const LINE_READ_CHUNK: usize = 512;
const MAX_LINE_LEN: usize = 8 * 1024;

pub trait Connection {
    /// Read available bytes. `Ok(0)` means none are available right now;
    /// use [`Connection::connected`] to tell that apart from end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn connected(&self) -> bool;
}

/// Opens one connection per pull.
pub trait Connector {
    type Conn: Connection;

    fn connect(&mut self, host: &str, port: u16, tls: bool) -> io::Result<Self::Conn>;
}

/// Plain-TCP connector over `std::net`. TLS must be supplied by another
/// `Connector`; this one refuses `https` targets.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub connect_timeout: Duration,
    /// Upper bound on a single blocking read before it reports `Ok(0)`.
    pub read_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl TcpConnector {
    pub fn from_config(config: &PullConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            ..Self::default()
        }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    fn connect(&mut self, host: &str, port: u16, tls: bool) -> io::Result<TcpConnection> {
        if tls {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "TcpConnector does not speak TLS",
            ));
        }
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve"));
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    return Ok(TcpConnection { stream, eof: false });
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    eof: bool,
}

impl Connection for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => {
                self.eof = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(err) => {
                self.eof = true;
                Err(err)
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()
    }

    fn connected(&self) -> bool {
        !self.eof
    }
}

/// A connection with a small read-ahead buffer for line-oriented headers.
#[derive(Debug)]
pub struct BufferedConnection<C> {
    inner: C,
    pending: Vec<u8>,
    failed: bool,
}

impl<C: Connection> BufferedConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            failed: false,
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// True while buffered bytes remain or the peer is still connected.
    pub fn is_open(&self) -> bool {
        !self.pending.is_empty() || self.peer_connected()
    }

    fn peer_connected(&self) -> bool {
        !self.failed && self.inner.connected()
    }

    /// Next line without its `\n` and at most one trailing `\r`. Returns
    /// `None` once the peer is gone and nothing is buffered. A partial line
    /// left at disconnect is returned as-is. Lines longer than
    /// `MAX_LINE_LEN` fail the response rather than being split.
    pub fn read_line(&mut self, watchdog: &mut Watchdog) -> Result<Option<String>, PullError> {
        loop {
            let newline = self.pending.iter().position(|b| *b == b'\n');
            if newline.unwrap_or(self.pending.len()) > MAX_LINE_LEN {
                return Err(PullError::HeaderLineTooLong { max: MAX_LINE_LEN });
            }
            if let Some(pos) = newline {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                return Ok(Some(finish_line(line)));
            }
            if !self.peer_connected() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.pending);
                return Ok(Some(finish_line(line)));
            }

            let mut chunk = [0u8; LINE_READ_CHUNK];
            let n = self.read_inner(&mut chunk);
            if n == 0 {
                if self.peer_connected() {
                    watchdog.idle()?;
                }
                continue;
            }
            watchdog.progressed();
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read body bytes, draining the read-ahead buffer first. Transport
    /// errors are logged and treated as the peer going away.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return n;
        }
        self.read_inner(buf)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> usize {
        if self.failed {
            return 0;
        }
        match self.inner.read(buf) {
            Ok(n) => n,
            Err(err) => {
                log::warn!("connection read failed: {err}");
                self.failed = true;
                0
            }
        }
    }
}

fn finish_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8_lossy(&line).into_owned()
}
