use thiserror::Error;

/// All errors produced by the S2AStream transport layer.
#[derive(Debug, Error)]
pub enum S2aStreamError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("empty frame body")]
    EmptyFrame,

    #[error("unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("stream {0} not found")]
    StreamNotFound(u32),

    #[error("stream {0} already exists")]
    StreamAlreadyExists(u32),

    #[error("stream {0} is closed")]
    StreamClosed(u32),

    #[error("stream {stream_id} reset by peer (code {error_code})")]
    StreamReset { stream_id: u32, error_code: u32 },

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("maximum streams ({0}) exceeded")]
    MaxStreamsExceeded(u32),

    #[error("invalid stream id: 0x{0:08x}")]
    InvalidStreamId(u32),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, S2aStreamError>;
