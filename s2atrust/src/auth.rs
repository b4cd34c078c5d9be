// Authentication mechanism validation.
//
// A request is accepted when it carries at least one mechanism with a
// non-empty opaque token. Identity-only mechanisms are structurally accepted
// and passed through to the caller record without being evaluated. Tokens
// are never logged or retained.

use thiserror::Error;

use crate::proto::identity::IdentityOneof;
use crate::proto::{status_code, AuthenticationMechanism};

/// Why a request's credentials were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no authentication mechanisms provided")]
    NoMechanisms,

    #[error("no authentication mechanism carries a token")]
    NoToken,
}

impl AuthError {
    /// Status code reported to the caller.
    pub fn status_code(&self) -> u32 {
        status_code::UNAUTHENTICATED
    }
}

/// What was learned about an accepted caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Caller {
    /// Number of mechanisms presented.
    pub mechanisms: usize,
    /// Number of mechanisms carrying a non-empty token.
    pub tokens: usize,
    /// Identity claims, unevaluated.
    pub identities: Vec<IdentityOneof>,
}

/// Accept or reject a request's credentials.
pub fn validate(mechanisms: &[AuthenticationMechanism]) -> Result<Caller, AuthError> {
    if mechanisms.is_empty() {
        return Err(AuthError::NoMechanisms);
    }

    let tokens = mechanisms
        .iter()
        .filter_map(AuthenticationMechanism::token_str)
        .filter(|t| !t.is_empty())
        .count();
    if tokens == 0 {
        return Err(AuthError::NoToken);
    }

    let identities = mechanisms
        .iter()
        .filter_map(|m| m.identity.as_ref())
        .filter_map(|i| i.identity_oneof.clone())
        .collect();

    Ok(Caller {
        mechanisms: mechanisms.len(),
        tokens,
        identities,
    })
}
