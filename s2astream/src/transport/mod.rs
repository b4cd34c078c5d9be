//! The message channel abstraction session protocols are written against.
//!
//! A [`Channel`] is one ordered, bidirectional message stream. [`BiStream`]
//! carries it over a multiplexed connection; [`memory::MemoryChannel`] carries
//! it in-process.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::stream::BiStream;

/// An ordered, bidirectional stream of whole messages.
#[async_trait]
pub trait Channel: Send {
    /// Identifier used in logs.
    fn id(&self) -> u32;

    /// Send one message.
    async fn send(&mut self, payload: Bytes) -> Result<()>;

    /// Receive the next message. `Ok(None)` means the peer finished sending.
    async fn recv(&mut self) -> Result<Option<Bytes>>;

    /// Finish the local sending side.
    async fn finish(&mut self) -> Result<()>;

    /// Token cancelled when the peer goes away abruptly (reset, dropped, or
    /// the underlying connection died). A graceful finish does not cancel it.
    fn cancellation(&self) -> CancellationToken;
}

#[async_trait]
impl Channel for BiStream {
    fn id(&self) -> u32 {
        BiStream::id(self)
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        BiStream::send(self, payload).await
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        BiStream::recv(self).await
    }

    async fn finish(&mut self) -> Result<()> {
        BiStream::finish(self).await
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancellation_token()
    }
}
