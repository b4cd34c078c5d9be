// Session agent capability interface and the policy-backed agent.
//
// Both the real agent and the deterministic fake implement `SessionAgent`,
// so the session state machine and conformance tests run unchanged against
// either.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{self, AuthError, Caller};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::policy::{PolicySnapshot, Side};
use crate::proto::get_tls_configuration_resp::TlsConfiguration;
use crate::proto::{status_code, AuthenticationMechanism};

/// Why a configuration could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A backing store could not be reached. Callers may retry.
    #[error("resolver unavailable: {0}")]
    Unavailable(String),

    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl ResolveError {
    /// Status code reported to the caller.
    pub fn status_code(&self) -> u32 {
        match self {
            ResolveError::Unavailable(_) => status_code::UNAVAILABLE,
            ResolveError::Internal(_) => status_code::INTERNAL,
        }
    }
}

/// The validate-then-resolve contract served on every session stream.
#[async_trait]
pub trait SessionAgent: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Accept or reject a request's credentials.
    fn validate(&self, mechanisms: &[AuthenticationMechanism]) -> std::result::Result<Caller, AuthError> {
        auth::validate(mechanisms)
    }

    /// Resolve the TLS configuration for `side`. May suspend; the session
    /// abandons the call if the stream goes away.
    async fn resolve(
        &self,
        caller: &Caller,
        side: Side,
    ) -> std::result::Result<TlsConfiguration, ResolveError>;
}

/// Agent answering from an immutable [`PolicySnapshot`].
#[derive(Debug, Clone)]
pub struct PolicyAgent {
    name: String,
    snapshot: Arc<PolicySnapshot>,
}

impl PolicyAgent {
    pub fn new(name: impl Into<String>, snapshot: Arc<PolicySnapshot>) -> Self {
        Self {
            name: name.into(),
            snapshot,
        }
    }

    /// Load certificate material and policy named by `config`.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let snapshot = config.load_policy()?;
        tracing::info!(
            client_leaf_sha256 = %snapshot.client_chain().leaf_fingerprint(),
            server_leaf_sha256 = %snapshot.server_chain().leaf_fingerprint(),
            "policy snapshot loaded"
        );
        Ok(Self::new("policy", Arc::new(snapshot)))
    }

    pub fn snapshot(&self) -> &Arc<PolicySnapshot> {
        &self.snapshot
    }
}

#[async_trait]
impl SessionAgent for PolicyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        _caller: &Caller,
        side: Side,
    ) -> std::result::Result<TlsConfiguration, ResolveError> {
        Ok(self.snapshot.resolve(side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::CertificateChain;

    fn agent() -> PolicyAgent {
        let snapshot = PolicySnapshot::builder()
            .client_chain(CertificateChain::from_pem(include_str!("../testdata/chain.pem")).unwrap())
            .server_chain(
                CertificateChain::from_pem(include_str!("../testdata/server_cert.pem")).unwrap(),
            )
            .build()
            .unwrap();
        PolicyAgent::new("test", Arc::new(snapshot))
    }

    #[tokio::test]
    async fn resolves_from_snapshot() {
        let agent = agent();
        let caller = agent.validate(&[AuthenticationMechanism::token("t")]).unwrap();
        let cfg = agent.resolve(&caller, Side::Client).await.unwrap();
        assert_eq!(cfg, agent.snapshot().resolve(Side::Client));
        assert_eq!(agent.name(), "test");
    }

    #[test]
    fn default_validation_is_token_presence() {
        let agent = agent();
        assert_eq!(agent.validate(&[]), Err(AuthError::NoMechanisms));
        assert!(agent.validate(&[AuthenticationMechanism::token("x")]).is_ok());
    }

    #[test]
    fn resolve_errors_map_to_distinct_codes() {
        assert_eq!(
            ResolveError::Unavailable("store down".into()).status_code(),
            status_code::UNAVAILABLE
        );
        assert_eq!(
            ResolveError::Internal("bug".into()).status_code(),
            status_code::INTERNAL
        );
    }
}
