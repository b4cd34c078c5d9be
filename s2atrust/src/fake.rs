// Deterministic fake agent for protocol conformance testing.
//
// Serves the same contract as `PolicyAgent`, differing only in content: the
// certificate chains are fixed test certificates bundled with the crate, and
// any non-empty token is accepted.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{PolicyAgent, ResolveError, SessionAgent};
use crate::auth::Caller;
use crate::certs::CertificateChain;
use crate::error::Result;
use crate::policy::{PolicySnapshot, Side};
use crate::proto::get_tls_configuration_resp::TlsConfiguration;
use crate::server::{AgentServer, RunningServer, ServerConfig};

/// Fixed client identity certificate.
pub const CLIENT_CERT_PEM: &str = include_str!("../testdata/client_cert.pem");

/// Fixed server identity certificate.
pub const SERVER_CERT_PEM: &str = include_str!("../testdata/server_cert.pem");

/// Agent with fixed, reproducible outputs.
#[derive(Debug, Clone)]
pub struct FakeAgent {
    inner: PolicyAgent,
}

impl FakeAgent {
    /// Build the fake with the bundled certificates and default server policy.
    pub fn new() -> Result<Self> {
        let snapshot = PolicySnapshot::builder()
            .client_chain(CertificateChain::from_pem(CLIENT_CERT_PEM)?)
            .server_chain(CertificateChain::from_pem(SERVER_CERT_PEM)?)
            .build()?;
        Ok(Self {
            inner: PolicyAgent::new("fake", Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> &PolicySnapshot {
        self.inner.snapshot()
    }

    /// Serve the fake on an ephemeral loopback port.
    pub async fn start() -> Result<RunningServer> {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        AgentServer::new(Arc::new(Self::new()?), ServerConfig::default())
            .spawn(addr)
            .await
    }
}

#[async_trait]
impl SessionAgent for FakeAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn resolve(
        &self,
        caller: &Caller,
        side: Side,
    ) -> std::result::Result<TlsConfiguration, ResolveError> {
        self.inner.resolve(caller, side).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{AuthenticationMechanism, RequestClientCertificate};

    #[test]
    fn bundled_certificates_are_used() {
        let fake = FakeAgent::new().unwrap();
        assert_eq!(fake.snapshot().client_chain().pems(), [CLIENT_CERT_PEM]);
        assert_eq!(fake.snapshot().server_chain().pems(), [SERVER_CERT_PEM]);
        assert_eq!(
            fake.snapshot().server_policy().request_client_certificate,
            RequestClientCertificate::RequestAndVerify
        );
    }

    #[tokio::test]
    async fn outputs_are_reproducible() {
        let a = FakeAgent::new().unwrap();
        let b = FakeAgent::new().unwrap();
        let caller = a.validate(&[AuthenticationMechanism::token("token")]).unwrap();
        for side in [Side::Client, Side::Server] {
            assert_eq!(
                a.resolve(&caller, side).await.unwrap(),
                b.resolve(&caller, side).await.unwrap()
            );
        }
    }
}
