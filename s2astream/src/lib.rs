//! S2AStream -- multiplexed bidirectional session streams.
//!
//! One byte-stream connection (TCP, or anything `AsyncRead + AsyncWrite`)
//! carries many independent, ordered, message-oriented streams:
//! - **Framing**: length-prefixed [`Frame`]s via [`FrameCodec`]
//! - **Multiplexing**: per-stream routing and half-close state in [`Multiplexer`]
//! - **Handles**: [`BiStream`] for applications, behind the [`Channel`] trait

pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod mux;
pub mod stream;
pub mod transport;

// Re-export key public types at crate root.
pub use codec::FrameCodec;
pub use connection::{ClientConnection, Connection, ConnectionConfig, ServerConnection};
pub use error::{Result, S2aStreamError};
pub use frame::Frame;
pub use mux::{Multiplexer, StreamId};
pub use stream::{BiStream, StreamState};
pub use transport::Channel;
