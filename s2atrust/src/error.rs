// S2ATrust error types

use s2astream::S2aStreamError;
use thiserror::Error;

/// Top-level error type for the S2ATrust crate.
#[derive(Debug, Error)]
pub enum S2aTrustError {
    // ── Transport errors ────────────────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(#[from] S2aStreamError),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Certificate and policy errors ───────────────────────────────────
    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("invalid policy: {0}")]
    Policy(String),

    // ── Configuration errors ────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Session errors ──────────────────────────────────────────────────
    #[error("invalid session state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("session request failed with status {code}: {details}")]
    Status { code: u32, details: String },

    #[error("response contract violation: {0}")]
    ContractViolation(String),

    #[error("stream ended before a response arrived")]
    StreamEnded,

    #[error("session stream cancelled by peer")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, S2aTrustError>;
