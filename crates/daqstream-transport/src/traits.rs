use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected stream to a remote client or server. Implements Read + Write.
///
/// This is the I/O type returned by transport operations. It remembers the
/// remote address so every layer above can tag its logs with it.
pub struct DaqStream {
    inner: TcpStream,
    peer_addr: SocketAddr,
}

impl Read for DaqStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for DaqStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl DaqStream {
    /// Wrap a connected TCP stream.
    ///
    /// Nagle is disabled: command frames are tiny and latency matters more
    /// than packet count.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: stream,
            peer_addr,
        })
    }

    /// Remote address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer_addr: self.peer_addr,
        })
    }

    /// Shut down both halves of the connection.
    ///
    /// Already-closed sockets are not an error.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for DaqStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaqStream")
            .field("type", &"tcp")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
