// Agent serving loop.
//
// One task per accepted connection, one task per session stream on it. A
// failing stream or connection is logged and never affects the others.

use std::net::SocketAddr;
use std::sync::Arc;

use s2astream::{Connection, ConnectionConfig, S2aStreamError};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::agent::SessionAgent;
use crate::config::AgentConfig;
use crate::error::{Result, S2aTrustError};
use crate::session::Session;

/// Serving parameters.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub connection: ConnectionConfig,
}

impl From<&AgentConfig> for ServerConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            connection: config.connection_config(),
        }
    }
}

/// Serves the session protocol for one agent.
pub struct AgentServer<A: ?Sized> {
    agent: Arc<A>,
    config: ServerConfig,
}

impl<A> AgentServer<A>
where
    A: SessionAgent + ?Sized,
{
    pub fn new(agent: Arc<A>, config: ServerConfig) -> Self {
        Self { agent, config }
    }

    /// Accept connections on `listener` until `shutdown` is cancelled.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            addr = ?listener.local_addr().ok(),
            agent = self.agent.name(),
            "agent serving"
        );
        loop {
            let (socket, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };
            tokio::spawn(serve_connection(
                socket,
                peer,
                Arc::clone(&self.agent),
                self.config.connection.clone(),
                shutdown.child_token(),
            ));
        }
        tracing::info!("agent stopped");
        Ok(())
    }

    /// Bind `addr` and serve in the background.
    pub async fn spawn(self, addr: SocketAddr) -> Result<RunningServer> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { self.serve(listener, token).await });
        Ok(RunningServer {
            local_addr,
            handle,
            guard: shutdown.drop_guard(),
        })
    }
}

/// A server running in the background. Dropping it stops the server.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: JoinHandle<Result<()>>,
    guard: DropGuard,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection, and wait for the loop to end.
    pub async fn stop(self) -> Result<()> {
        let Self { handle, guard, .. } = self;
        drop(guard);
        handle
            .await
            .map_err(|e| S2aTrustError::Io(std::io::Error::other(e)))?
    }
}

async fn serve_connection<A>(
    socket: TcpStream,
    peer: SocketAddr,
    agent: Arc<A>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) where
    A: SessionAgent + ?Sized,
{
    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "set_nodelay failed");
    }
    tracing::debug!(%peer, "connection accepted");

    let mut connection = Connection::server(socket, config);
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            stream = connection.accept() => stream,
        };
        let Some(stream) = stream else { break };
        let session = Session::new(stream, Arc::clone(&agent));
        tokio::spawn(async move {
            match session.run().await {
                Ok(summary) => tracing::debug!(
                    %peer,
                    stream_id = summary.stream_id,
                    responses = summary.responses,
                    "session finished"
                ),
                Err(e) if is_peer_abort(&e) => {
                    tracing::debug!(%peer, error = %e, "session aborted by peer")
                }
                Err(e) => tracing::warn!(%peer, error = %e, "session failed"),
            }
        });
    }

    connection.close();
    match connection.closed().await {
        Ok(()) => tracing::debug!(%peer, "connection closed"),
        Err(e) => tracing::warn!(%peer, error = %e, "connection failed"),
    }
}

/// Peers are free to abandon streams; that is not worth a warning.
fn is_peer_abort(e: &S2aTrustError) -> bool {
    matches!(
        e,
        S2aTrustError::Cancelled
            | S2aTrustError::Transport(
                S2aStreamError::StreamReset { .. } | S2aStreamError::ConnectionClosed
            )
    )
}
