//! In-process channel pair.
//!
//! Both ends behave like the two ends of a [`BiStream`](crate::BiStream):
//! messages arrive in order, `finish` yields a clean end of input on the
//! other side, and dropping an end without finishing cancels the peer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, S2aStreamError};
use crate::transport::Channel;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// One end of an in-process duplex created by [`pair`].
pub struct MemoryChannel {
    id: u32,
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
    /// Set by this end's `finish`; read by the peer.
    finished: Arc<AtomicBool>,
    peer_finished: Arc<AtomicBool>,
    peer_gone: CancellationToken,
    /// Cancelled if this end is dropped without finishing.
    gone: CancellationToken,
}

/// Create a connected pair of channels, each buffering up to `capacity`
/// messages in flight.
pub fn pair(capacity: usize) -> (MemoryChannel, MemoryChannel) {
    let id = NEXT_ID.fetch_add(2, Ordering::Relaxed);
    let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
    let a_finished = Arc::new(AtomicBool::new(false));
    let b_finished = Arc::new(AtomicBool::new(false));
    let a_gone = CancellationToken::new();
    let b_gone = CancellationToken::new();

    let a = MemoryChannel {
        id,
        tx: Some(a_tx),
        rx: a_rx,
        finished: Arc::clone(&a_finished),
        peer_finished: Arc::clone(&b_finished),
        peer_gone: b_gone.clone(),
        gone: a_gone.clone(),
    };
    let b = MemoryChannel {
        id: id + 1,
        tx: Some(b_tx),
        rx: b_rx,
        finished: b_finished,
        peer_finished: a_finished,
        peer_gone: a_gone,
        gone: b_gone,
    };
    (a, b)
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> u32 {
        self.id
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(S2aStreamError::StreamClosed(self.id))?;
        tx.send(payload)
            .await
            .map_err(|_| S2aStreamError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.rx.recv().await {
            Some(payload) => Ok(Some(payload)),
            None if self.peer_finished.load(Ordering::Acquire) => Ok(None),
            None => Err(S2aStreamError::ConnectionClosed),
        }
    }

    async fn finish(&mut self) -> Result<()> {
        // The flag must be visible before the peer can observe the close.
        if let Some(tx) = self.tx.take() {
            self.finished.store(true, Ordering::Release);
            drop(tx);
        }
        Ok(())
    }

    fn cancellation(&self) -> CancellationToken {
        self.peer_gone.clone()
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) {
            self.gone.cancel();
        }
    }
}
