//! Individual stream state and the application-facing stream handle.
//!
//! Each stream starts Open and closes one direction at a time:
//! Open -> HalfClosedLocal / HalfClosedRemote -> Closed. A reset from either
//! side jumps straight to Closed.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, S2aStreamError};
use crate::frame::{reset_code, Frame};
use crate::mux::{Inbound, Multiplexer, StreamId};

/// Stream state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Stream is fully open for bidirectional communication.
    Open,
    /// Local side has sent FIN; can still receive.
    HalfClosedLocal,
    /// Remote side has sent FIN; can still send.
    HalfClosedRemote,
    /// Stream is fully closed.
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Open => write!(f, "Open"),
            StreamState::HalfClosedLocal => write!(f, "HalfClosedLocal"),
            StreamState::HalfClosedRemote => write!(f, "HalfClosedRemote"),
            StreamState::Closed => write!(f, "Closed"),
        }
    }
}

impl StreamState {
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// State after the local side finishes. Finishing twice is a no-op.
    pub fn finish_local(self) -> Self {
        match self {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            StreamState::HalfClosedLocal | StreamState::Closed => self,
        }
    }

    /// State after the peer finishes. A second FIN is a protocol violation.
    pub fn finish_remote(self) -> Result<Self> {
        match self {
            StreamState::Open => Ok(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => Ok(StreamState::Closed),
            StreamState::HalfClosedRemote | StreamState::Closed => {
                Err(S2aStreamError::InvalidStateTransition {
                    from: self.to_string(),
                    to: "HalfClosedRemote".into(),
                })
            }
        }
    }
}

/// Application handle for one multiplexed bidirectional stream.
///
/// Outbound frames are queued to the connection driver; inbound payloads are
/// delivered by the driver in the order the peer sent them. Dropping a handle
/// that is not fully closed resets the stream with `CANCEL`.
pub struct BiStream {
    id: StreamId,
    state: StreamState,
    reset: Option<u32>,
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Inbound>,
    mux: Arc<Mutex<Multiplexer>>,
    cancel: CancellationToken,
}

impl BiStream {
    pub(crate) fn new(
        id: StreamId,
        outbound: mpsc::Sender<Frame>,
        inbound: mpsc::Receiver<Inbound>,
        mux: Arc<Mutex<Multiplexer>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            state: StreamState::Open,
            reset: None,
            outbound,
            inbound,
            mux,
            cancel,
        }
    }

    /// Returns the stream ID.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Returns the current state as seen by this handle.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Send one message on this stream.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        if let Some(error_code) = self.reset {
            return Err(S2aStreamError::StreamReset {
                stream_id: self.id,
                error_code,
            });
        }
        if !self.state.can_send() || self.cancel.is_cancelled() {
            return Err(S2aStreamError::StreamClosed(self.id));
        }
        self.outbound
            .send(Frame::Data {
                stream_id: self.id,
                payload,
            })
            .await
            .map_err(|_| S2aStreamError::ConnectionClosed)
    }

    /// Receive the next message.
    ///
    /// `Ok(None)` means the peer finished its side: a normal end of input.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(error_code) = self.reset {
            return Err(S2aStreamError::StreamReset {
                stream_id: self.id,
                error_code,
            });
        }
        if !self.state.can_recv() {
            return Ok(None);
        }

        match self.inbound.recv().await {
            Some(Inbound::Data(payload)) => Ok(Some(payload)),
            Some(Inbound::Fin) => {
                self.state = self.state.finish_remote()?;
                Ok(None)
            }
            Some(Inbound::Reset(error_code)) => {
                self.state = StreamState::Closed;
                self.reset = Some(error_code);
                Err(S2aStreamError::StreamReset {
                    stream_id: self.id,
                    error_code,
                })
            }
            None => {
                self.state = StreamState::Closed;
                Err(S2aStreamError::ConnectionClosed)
            }
        }
    }

    /// Close the local side. The peer observes end of input after draining
    /// everything sent before this call.
    pub async fn finish(&mut self) -> Result<()> {
        if self.reset.is_some()
            || matches!(self.state, StreamState::HalfClosedLocal | StreamState::Closed)
        {
            return Ok(()); // idempotent
        }
        self.state = self.state.finish_local();
        self.mux.lock().finish_local(self.id);
        self.outbound
            .send(Frame::Fin { stream_id: self.id })
            .await
            .map_err(|_| S2aStreamError::ConnectionClosed)
    }

    /// Abruptly terminate the stream in both directions.
    pub async fn reset(mut self, error_code: u32) -> Result<()> {
        self.mark_reset(error_code);
        self.outbound
            .send(Frame::Rst {
                stream_id: self.id,
                error_code,
            })
            .await
            .map_err(|_| S2aStreamError::ConnectionClosed)
    }

    /// Completes once the peer has reset this stream or the connection
    /// carrying it has gone away. A peer FIN does not count.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the token behind [`cancelled`](Self::cancelled).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn mark_reset(&mut self, error_code: u32) {
        self.state = StreamState::Closed;
        self.reset = Some(error_code);
        self.mux.lock().reset_local(self.id);
    }
}

impl fmt::Debug for BiStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiStream")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("reset", &self.reset)
            .finish()
    }
}

impl Drop for BiStream {
    fn drop(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.mark_reset(reset_code::CANCEL);
        let _ = self.outbound.try_send(Frame::Rst {
            stream_id: self.id,
            error_code: reset_code::CANCEL,
        });
    }
}
