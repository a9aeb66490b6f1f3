use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DaqStream;

/// TCP listener transport.
///
/// Provides bind/accept/connect over IPv4 and IPv6 sockets. Accepting can be
/// blocking or polled, so a server loop can observe a shutdown flag between
/// connections.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (e.g. `0.0.0.0:8000`, `127.0.0.1:0`).
    pub fn bind(addr: &str) -> Result<Self> {
        let addr = resolve(addr)?;
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<DaqStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(peer = %addr, "accepted connection");
        prepare_accepted(stream)
    }

    /// Accept an incoming connection if one is pending.
    ///
    /// Requires [`TcpTransport::set_nonblocking`] to have been enabled,
    /// otherwise this behaves like [`TcpTransport::accept`].
    pub fn try_accept(&self) -> Result<Option<DaqStream>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "accepted connection");
                prepare_accepted(stream).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Switch the listening socket between blocking and polled accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Connect to a listening server (blocking).
    pub fn connect(addr: &str) -> Result<DaqStream> {
        let addr = resolve(addr)?;
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected to tcp socket");
        DaqStream::from_tcp(stream)
    }

    /// Connect to a listening server, giving up after `timeout`.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<DaqStream> {
        let addr = resolve(addr)?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected to tcp socket");
        DaqStream::from_tcp(stream)
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

// Accepted sockets inherit the listener's non-blocking flag on some platforms.
fn prepare_accepted(stream: TcpStream) -> Result<DaqStream> {
    stream.set_nonblocking(false)?;
    DaqStream::from_tcp(stream)
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    let mut candidates = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?;
    candidates.next().ok_or_else(|| TransportError::Resolve {
        addr: addr.to_string(),
        source: std::io::Error::new(ErrorKind::NotFound, "no socket address resolved"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect(&addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(server.peer_addr().ip().is_loopback());

        handle.join().unwrap();
    }

    #[test]
    fn test_ephemeral_port_is_assigned() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.transport_name(), "tcp");
    }

    #[test]
    fn test_try_accept_without_pending_connection() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        assert!(listener.try_accept().unwrap().is_none());
    }

    #[test]
    fn test_try_accept_returns_blocking_stream() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().to_string();

        let mut client = TcpTransport::connect(&addr).unwrap();
        client.write_all(b"x").unwrap();

        let mut accepted = None;
        for _ in 0..200 {
            if let Some(stream) = listener.try_accept().unwrap() {
                accepted = Some(stream);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut server = accepted.expect("connection should be accepted");
        let mut buf = [0u8; 1];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn test_unresolvable_address() {
        let result = TcpTransport::bind("not an address");
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
            listener.local_addr().to_string()
        };
        let result = TcpTransport::connect(&addr);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        let client = TcpTransport::connect(&addr).unwrap();
        let _server = listener.accept().unwrap();

        client.shutdown().unwrap();
        client.shutdown().unwrap();
    }
}
