use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use daqstream_acquire::AcquisitionEngine;
use daqstream_transport::{DaqStream, TcpTransport};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::session::{serve_connection, ServerContext, SessionSummary};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stops a running [`StreamServer`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// Accepts clients one at a time and runs each session on its own thread.
pub struct StreamServer {
    transport: TcpTransport,
    ctx: Arc<ServerContext>,
    sessions: AtomicU64,
}

impl StreamServer {
    /// Bind `config.bind` and serve `engine`.
    pub fn bind(config: ServerConfig, engine: Arc<AcquisitionEngine>) -> Result<Self> {
        let ctx = ServerContext::new(engine, config)?;
        let transport = TcpTransport::bind(&ctx.config.bind)?;
        info!(
            addr = %transport.local_addr(),
            transport = transport.transport_name(),
            "stream server listening"
        );
        Ok(Self {
            transport,
            ctx: Arc::new(ctx),
            sessions: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.ctx.running_flag(),
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Sessions served so far.
    pub fn session_count(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Accept and serve clients until shut down. Session failures are logged
    /// and do not stop the server.
    pub fn serve(&self) -> Result<()> {
        self.transport.set_nonblocking(true)?;
        while self.ctx.is_running() {
            match self.transport.try_accept() {
                Ok(Some(stream)) => {
                    let peer = stream.peer_addr();
                    if let Err(err) = self.run_session(stream) {
                        debug!(%peer, error = %err, "session ended with error");
                    }
                }
                Ok(None) => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        info!(sessions = self.session_count(), "stream server stopped");
        Ok(())
    }

    /// Block for one client and serve it to completion.
    pub fn serve_one(&self) -> Result<SessionSummary> {
        self.transport.set_nonblocking(false)?;
        let stream = self.transport.accept()?;
        self.run_session(stream)
    }

    fn run_session(&self, stream: DaqStream) -> Result<SessionSummary> {
        let peer = stream.peer_addr();
        let id = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        let ctx = Arc::clone(&self.ctx);

        let handle = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || serve_connection(&ctx, stream))
            .inspect_err(|err| error!(%peer, error = %err, "failed to spawn session thread"))?;

        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!(%peer, "session thread panicked");
                Err(ServerError::SessionPanicked(peer))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use daqstream_acquire::{HardwareOverrunPolicy, SimulatedSource};

    use super::*;
    use crate::client::StreamClient;

    fn test_server(config: ServerConfig) -> StreamServer {
        let engine = AcquisitionEngine::open(
            SimulatedSource::new(50.0, 1.0),
            config.channel_config().unwrap(),
            HardwareOverrunPolicy::Report,
        )
        .unwrap();
        StreamServer::bind(config, Arc::new(engine)).unwrap()
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            block_size: 512,
            segment_length: 128,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn bind_rejects_invalid_config() {
        let engine = AcquisitionEngine::new(
            SimulatedSource::new(1.0, 1.0),
            HardwareOverrunPolicy::Report,
        );
        let config = ServerConfig {
            segment_length: 1024,
            ..local_config()
        };
        assert!(matches!(
            StreamServer::bind(config, Arc::new(engine)),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn serve_one_counts_commands() {
        let server = test_server(local_config());
        let addr = server.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut client = StreamClient::connect(&addr).unwrap();
            client.stream().unwrap();
            client.stream().unwrap();
        });

        let summary = server.serve_one().unwrap();
        client.join().unwrap();
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.degraded, 0);
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn serve_accepts_sequential_clients_until_shutdown() {
        let server = test_server(local_config());
        let addr = server.local_addr().to_string();
        let shutdown = server.shutdown_handle();

        let clients = thread::spawn(move || {
            for _ in 0..3 {
                let mut client = StreamClient::connect(&addr).unwrap();
                assert_eq!(client.hello().block_size, 512);
                client.stream().unwrap();
            }
            shutdown.shutdown();
        });

        server.serve().unwrap();
        clients.join().unwrap();
        assert_eq!(server.session_count(), 3);
    }

    #[test]
    fn failed_session_setup_drops_only_that_client() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        let engine = AcquisitionEngine::open(
            SimulatedSource::new(50.0, 1.0),
            local_config().channel_config().unwrap(),
            HardwareOverrunPolicy::Report,
        )
        .unwrap();
        let mut ctx = ServerContext::new(Arc::new(engine), local_config()).unwrap();
        // Below socket resolution: the writer cannot be configured.
        ctx.config.write_timeout_secs = 1e-12;

        let client = thread::spawn(move || StreamClient::connect(&addr).is_err());
        let stream = listener.accept().unwrap();
        assert!(serve_connection(&ctx, stream).is_err());
        assert!(client.join().unwrap(), "client must see the connection close");
    }
}
