//! Connection driver.
//!
//! One tokio task per connection owns the framed socket. It writes frames
//! queued by stream handles and routes inbound frames to the right stream.
//! When the socket ends or fails, every stream on that connection is torn
//! down; other connections are unaffected.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::codec::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{Result, S2aStreamError};
use crate::frame::{reset_code, Frame};
use crate::mux::{Inbound, Multiplexer, Role, StreamId};
use crate::stream::BiStream;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of concurrent streams.
    pub max_streams: u32,
    /// Maximum encoded frame size accepted or produced.
    pub max_frame_size: usize,
    /// Inbound messages buffered per stream before the driver waits.
    pub stream_buffer: usize,
    /// Outbound frames buffered before stream handles wait.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_streams: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            stream_buffer: 32,
            outbound_buffer: 256,
        }
    }
}

/// State shared between the driver task and the public connection handle.
#[derive(Clone)]
struct Shared {
    mux: Arc<Mutex<Multiplexer>>,
    outbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
}

impl Shared {
    fn new(role: Role, config: &ConnectionConfig) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let mux = Multiplexer::new(role, config.max_streams, config.stream_buffer);
        (
            Self {
                mux: Arc::new(Mutex::new(mux)),
                outbound,
                shutdown: CancellationToken::new(),
            },
            outbound_rx,
        )
    }

    fn stream(&self, id: StreamId, registered: crate::mux::Registered) -> BiStream {
        BiStream::new(
            id,
            self.outbound.clone(),
            registered.inbound,
            Arc::clone(&self.mux),
            registered.cancel,
        )
    }
}

/// Entry points for establishing either end of a connection.
pub struct Connection;

impl Connection {
    /// Drive `io` as the initiating (client) end.
    pub fn client<T>(io: T, config: ConnectionConfig) -> ClientConnection
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (shared, outbound_rx) = Shared::new(Role::Client, &config);
        let driver = tokio::spawn(drive(io, config, shared.clone(), outbound_rx, None));
        let guard = shared.shutdown.clone().drop_guard();
        ClientConnection {
            shared,
            driver,
            guard,
        }
    }

    /// Drive `io` as the accepting (server) end.
    pub fn server<T>(io: T, config: ConnectionConfig) -> ServerConnection
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (shared, outbound_rx) = Shared::new(Role::Server, &config);
        let (incoming_tx, incoming) = mpsc::channel(config.stream_buffer.max(1));
        let driver = tokio::spawn(drive(
            io,
            config,
            shared.clone(),
            outbound_rx,
            Some(incoming_tx),
        ));
        let guard = shared.shutdown.clone().drop_guard();
        ServerConnection {
            shared,
            incoming,
            driver,
            guard,
        }
    }
}

/// Client end of a connection: opens streams.
///
/// Dropping the handle stops the driver.
pub struct ClientConnection {
    shared: Shared,
    driver: JoinHandle<Result<()>>,
    guard: DropGuard,
}

impl ClientConnection {
    /// Open a new stream.
    pub async fn open_stream(&self) -> Result<BiStream> {
        let registered = self.shared.mux.lock().open_local()?;
        let id = registered.id;
        let stream = self.shared.stream(id, registered);
        self.shared
            .outbound
            .send(Frame::Open { stream_id: id })
            .await
            .map_err(|_| S2aStreamError::ConnectionClosed)?;
        tracing::trace!(stream_id = id, "stream opened");
        Ok(stream)
    }

    /// Number of streams currently tracked on this connection.
    pub fn stream_count(&self) -> usize {
        self.shared.mux.lock().stream_count()
    }

    /// Stop the driver. Open streams observe cancellation.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Wait for the driver to finish and report how the connection ended.
    pub async fn closed(self) -> Result<()> {
        let Self { driver, guard, .. } = self;
        let result = join(driver).await;
        drop(guard);
        result
    }
}

/// Server end of a connection: accepts streams opened by the client.
///
/// Dropping the handle stops the driver.
pub struct ServerConnection {
    shared: Shared,
    incoming: mpsc::Receiver<BiStream>,
    driver: JoinHandle<Result<()>>,
    guard: DropGuard,
}

impl ServerConnection {
    /// Wait for the next stream. `None` once the connection has ended.
    pub async fn accept(&mut self) -> Option<BiStream> {
        self.incoming.recv().await
    }

    /// Number of streams currently tracked on this connection.
    pub fn stream_count(&self) -> usize {
        self.shared.mux.lock().stream_count()
    }

    /// Stop the driver. Open streams observe cancellation.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Wait for the driver to finish and report how the connection ended.
    pub async fn closed(self) -> Result<()> {
        let Self { driver, guard, .. } = self;
        let result = join(driver).await;
        drop(guard);
        result
    }
}

async fn join(driver: JoinHandle<Result<()>>) -> Result<()> {
    match driver.await {
        Ok(result) => result,
        Err(e) => Err(S2aStreamError::Io(std::io::Error::other(e))),
    }
}

async fn drive<T>(
    io: T,
    config: ConnectionConfig,
    shared: Shared,
    mut outbound_rx: mpsc::Receiver<Frame>,
    incoming: Option<mpsc::Sender<BiStream>>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, FrameCodec::with_max_frame_size(config.max_frame_size));

    let result = loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break Ok(()),
            frame = outbound_rx.recv() => {
                // `shared` keeps a sender alive, so `None` cannot happen
                // while this task runs.
                let Some(frame) = frame else { break Ok(()) };
                if let Err(e) = framed.send(frame).await {
                    break Err(e);
                }
            }
            inbound = framed.next() => match inbound {
                Some(Ok(frame)) => {
                    if let Err(e) = dispatch(frame, &shared, incoming.as_ref(), &mut framed).await {
                        break Err(e);
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
        }
    };

    shared.mux.lock().teardown();
    match &result {
        Ok(()) => tracing::debug!("connection closed"),
        Err(e) => tracing::warn!(error = %e, "connection failed"),
    }
    result
}

/// Route one inbound frame. Only socket failures are returned as errors;
/// per-stream protocol violations are answered with RST.
async fn dispatch<T>(
    frame: Frame,
    shared: &Shared,
    incoming: Option<&mpsc::Sender<BiStream>>,
    framed: &mut Framed<T, FrameCodec>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match frame {
        Frame::Open { stream_id } => {
            let Some(incoming) = incoming else {
                tracing::debug!(stream_id, "peer opened a stream on a client connection");
                return reset(framed, stream_id, reset_code::PROTOCOL_ERROR).await;
            };
            let registered = shared.mux.lock().accept_remote(stream_id);
            match registered {
                Ok(registered) => {
                    let stream = shared.stream(stream_id, registered);
                    if incoming.send(stream).await.is_err() {
                        // Nobody is accepting; dropping the handle resets it.
                        tracing::debug!(stream_id, "stream refused: acceptor gone");
                    }
                    Ok(())
                }
                Err(S2aStreamError::MaxStreamsExceeded(max)) => {
                    tracing::warn!(stream_id, max, "stream refused: too many streams");
                    reset(framed, stream_id, reset_code::REFUSED_STREAM).await
                }
                Err(e) => {
                    tracing::debug!(stream_id, error = %e, "invalid stream open");
                    reset(framed, stream_id, reset_code::PROTOCOL_ERROR).await
                }
            }
        }
        Frame::Data { stream_id, payload } => {
            let sender = shared.mux.lock().data_sender(stream_id);
            match sender {
                Ok(sender) => {
                    // A dropped handle has already queued its own RST.
                    let _ = sender.send(Inbound::Data(payload)).await;
                    Ok(())
                }
                Err(S2aStreamError::StreamClosed(_)) => {
                    tracing::debug!(stream_id, "data after peer finish");
                    let sender = shared.mux.lock().reset_remote(stream_id);
                    if let Some(sender) = sender {
                        let _ = sender.try_send(Inbound::Reset(reset_code::PROTOCOL_ERROR));
                    }
                    reset(framed, stream_id, reset_code::PROTOCOL_ERROR).await
                }
                Err(_) => {
                    tracing::trace!(stream_id, "data for unknown stream ignored");
                    Ok(())
                }
            }
        }
        Frame::Fin { stream_id } => {
            let sender = shared.mux.lock().finish_remote(stream_id);
            match sender {
                Ok(sender) => {
                    let _ = sender.send(Inbound::Fin).await;
                    Ok(())
                }
                Err(S2aStreamError::InvalidStateTransition { .. }) => {
                    tracing::debug!(stream_id, "duplicate fin");
                    let sender = shared.mux.lock().reset_remote(stream_id);
                    if let Some(sender) = sender {
                        let _ = sender.try_send(Inbound::Reset(reset_code::PROTOCOL_ERROR));
                    }
                    reset(framed, stream_id, reset_code::PROTOCOL_ERROR).await
                }
                Err(_) => Ok(()),
            }
        }
        Frame::Rst {
            stream_id,
            error_code,
        } => {
            let sender = shared.mux.lock().reset_remote(stream_id);
            if let Some(sender) = sender {
                tracing::debug!(stream_id, error_code, "stream reset by peer");
                let _ = sender.try_send(Inbound::Reset(error_code));
            }
            Ok(())
        }
    }
}

async fn reset<T>(
    framed: &mut Framed<T, FrameCodec>,
    stream_id: StreamId,
    error_code: u32,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed
        .send(Frame::Rst {
            stream_id,
            error_code,
        })
        .await
}
