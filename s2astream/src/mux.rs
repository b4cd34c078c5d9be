//! Stream multiplexer / demultiplexer.
//!
//! Tracks the streams of one connection, identified by `StreamId` (u32), and
//! routes inbound frames to their handles. Streams opened by the client side
//! carry odd ids; the server side would use even ids.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, S2aStreamError};
use crate::stream::StreamState;

/// Type alias for stream identifiers.
pub type StreamId = u32;

/// Which end of the connection this multiplexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn first_local_id(self) -> StreamId {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }

    fn owns(self, id: StreamId) -> bool {
        (id % 2 == 1) == (self == Role::Client)
    }
}

/// Events the connection driver delivers to a stream handle.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(Bytes),
    Fin,
    Reset(u32),
}

struct StreamEntry {
    state: StreamState,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
}

/// Handle-side endpoints for a newly registered stream.
pub(crate) struct Registered {
    pub(crate) id: StreamId,
    pub(crate) inbound: mpsc::Receiver<Inbound>,
    pub(crate) cancel: CancellationToken,
}

/// Multiplexer managing all streams on a connection.
pub struct Multiplexer {
    role: Role,
    /// Active streams keyed by stream ID.
    streams: HashMap<StreamId, StreamEntry>,
    /// Next locally initiated stream ID.
    next_local_stream_id: u32,
    /// Maximum allowed concurrent streams.
    max_streams: u32,
    /// Per-stream inbound queue depth.
    stream_buffer: usize,
    /// Set once the connection is gone; no further streams are accepted.
    closed: bool,
}

impl Multiplexer {
    /// Create a new multiplexer.
    pub fn new(role: Role, max_streams: u32, stream_buffer: usize) -> Self {
        Self {
            role,
            streams: HashMap::new(),
            next_local_stream_id: role.first_local_id(),
            max_streams,
            stream_buffer: stream_buffer.max(1),
            closed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Allocate and register a locally initiated stream.
    pub(crate) fn open_local(&mut self) -> Result<Registered> {
        if self.closed {
            return Err(S2aStreamError::ConnectionClosed);
        }
        self.ensure_capacity()?;

        let id = self.next_local_stream_id;
        Self::validate_stream_id(id)?;
        self.next_local_stream_id = self.next_local_stream_id.wrapping_add(2);
        Ok(self.register(id))
    }

    /// Register a stream the peer opened.
    pub(crate) fn accept_remote(&mut self, id: StreamId) -> Result<Registered> {
        if self.closed {
            return Err(S2aStreamError::ConnectionClosed);
        }
        Self::validate_stream_id(id)?;
        if self.role.owns(id) {
            return Err(S2aStreamError::InvalidStreamId(id));
        }
        if self.streams.contains_key(&id) {
            return Err(S2aStreamError::StreamAlreadyExists(id));
        }
        self.ensure_capacity()?;
        Ok(self.register(id))
    }

    /// Sender used to deliver a DATA payload to the stream's handle.
    pub(crate) fn data_sender(&self, id: StreamId) -> Result<mpsc::Sender<Inbound>> {
        let entry = self
            .streams
            .get(&id)
            .ok_or(S2aStreamError::StreamNotFound(id))?;
        if !entry.state.can_recv() {
            return Err(S2aStreamError::StreamClosed(id));
        }
        Ok(entry.inbound.clone())
    }

    /// Record a peer FIN. Returns the sender used to deliver it.
    pub(crate) fn finish_remote(&mut self, id: StreamId) -> Result<mpsc::Sender<Inbound>> {
        let entry = self
            .streams
            .get_mut(&id)
            .ok_or(S2aStreamError::StreamNotFound(id))?;
        entry.state = entry.state.finish_remote()?;
        let sender = entry.inbound.clone();
        if entry.state == StreamState::Closed {
            self.streams.remove(&id);
        }
        Ok(sender)
    }

    /// Record a local FIN.
    pub(crate) fn finish_local(&mut self, id: StreamId) {
        if let Some(entry) = self.streams.get_mut(&id) {
            entry.state = entry.state.finish_local();
            if entry.state == StreamState::Closed {
                self.streams.remove(&id);
            }
        }
    }

    /// Remove a stream the peer reset, cancelling its handle. Returns the
    /// sender used to deliver the reset, if the stream was known.
    pub(crate) fn reset_remote(&mut self, id: StreamId) -> Option<mpsc::Sender<Inbound>> {
        let entry = self.streams.remove(&id)?;
        entry.cancel.cancel();
        Some(entry.inbound)
    }

    /// Remove a stream reset by its own handle.
    pub(crate) fn reset_local(&mut self, id: StreamId) {
        if let Some(entry) = self.streams.remove(&id) {
            entry.cancel.cancel();
        }
    }

    /// Tear down every stream after the connection ended. Handles observe
    /// cancellation and then `ConnectionClosed` on their next receive.
    pub(crate) fn teardown(&mut self) {
        self.closed = true;
        for (_, entry) in self.streams.drain() {
            entry.cancel.cancel();
        }
    }

    /// Current state of a stream, if it is still tracked.
    pub fn state(&self, id: StreamId) -> Option<StreamState> {
        self.streams.get(&id).map(|e| e.state)
    }

    /// Returns the number of tracked streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn register(&mut self, id: StreamId) -> Registered {
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let cancel = CancellationToken::new();
        self.streams.insert(
            id,
            StreamEntry {
                state: StreamState::Open,
                inbound: tx,
                cancel: cancel.clone(),
            },
        );
        Registered {
            id,
            inbound: rx,
            cancel,
        }
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.streams.len() as u32 >= self.max_streams {
            return Err(S2aStreamError::MaxStreamsExceeded(self.max_streams));
        }
        Ok(())
    }

    /// Stream IDs `0x00000000` and `0xFFFFFFFF` are reserved.
    fn validate_stream_id(id: StreamId) -> Result<()> {
        if id == 0x0000_0000 || id == 0xFFFF_FFFF {
            return Err(S2aStreamError::InvalidStreamId(id));
        }
        Ok(())
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new(Role::Client, 1024, 32)
    }
}
