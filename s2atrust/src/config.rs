// Agent configuration, read from JSON.
//
// {
//   "listen_addr": "127.0.0.1:8443",
//   "max_streams_per_connection": 1024,
//   "max_frame_size": 4194304,
//   "client_certificate_chain": "/etc/agent/client_chain.pem",
//   "server_certificate_chain": "/etc/agent/server_chain.pem",
//   "server_policy": {
//     "tls_resumption_enabled": false,
//     "request_client_certificate": "REQUEST_AND_VERIFY",
//     "max_overhead_of_ticket_aead": 0
//   }
// }
//
// Every field is optional; unknown fields are rejected.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use s2astream::codec::DEFAULT_MAX_FRAME_SIZE;
use s2astream::ConnectionConfig;
use serde::{Deserialize, Serialize};

use crate::certs::CertificateChain;
use crate::error::{Result, S2aTrustError};
use crate::policy::{PolicySnapshot, ServerPolicy};
use crate::proto::RequestClientCertificate;

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub listen_addr: SocketAddr,
    pub max_streams_per_connection: u32,
    pub max_frame_size: usize,
    /// PEM bundle handed to callers acting as TLS clients.
    pub client_certificate_chain: Option<PathBuf>,
    /// PEM bundle handed to callers acting as TLS servers.
    pub server_certificate_chain: Option<PathBuf>,
    pub server_policy: ServerPolicyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_streams_per_connection: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            client_certificate_chain: None,
            server_certificate_chain: None,
            server_policy: ServerPolicyConfig::default(),
        }
    }
}

/// Server-side TLS knobs as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerPolicyConfig {
    pub tls_resumption_enabled: bool,
    pub request_client_certificate: ClientCertificatePolicy,
    pub max_overhead_of_ticket_aead: u32,
}

impl Default for ServerPolicyConfig {
    fn default() -> Self {
        let policy = ServerPolicy::default();
        Self {
            tls_resumption_enabled: policy.tls_resumption_enabled,
            request_client_certificate: ClientCertificatePolicy::RequestAndVerify,
            max_overhead_of_ticket_aead: policy.max_overhead_of_ticket_aead,
        }
    }
}

impl From<ServerPolicyConfig> for ServerPolicy {
    fn from(config: ServerPolicyConfig) -> Self {
        Self {
            tls_resumption_enabled: config.tls_resumption_enabled,
            request_client_certificate: config.request_client_certificate.into(),
            max_overhead_of_ticket_aead: config.max_overhead_of_ticket_aead,
        }
    }
}

/// Client certificate request policy. There is no unspecified value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCertificatePolicy {
    DontRequest,
    RequestButDontVerify,
    RequestAndVerify,
}

impl From<ClientCertificatePolicy> for RequestClientCertificate {
    fn from(policy: ClientCertificatePolicy) -> Self {
        match policy {
            ClientCertificatePolicy::DontRequest => RequestClientCertificate::DontRequest,
            ClientCertificatePolicy::RequestButDontVerify => {
                RequestClientCertificate::RequestButDontVerify
            }
            ClientCertificatePolicy::RequestAndVerify => RequestClientCertificate::RequestAndVerify,
        }
    }
}

impl AgentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| S2aTrustError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Reject values the transport cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_streams_per_connection == 0 {
            return Err(S2aTrustError::Config(
                "max_streams_per_connection must be positive".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(S2aTrustError::Config("max_frame_size must be positive".into()));
        }
        Ok(())
    }

    /// Read both certificate chains and freeze the policy snapshot.
    pub fn load_policy(&self) -> Result<PolicySnapshot> {
        let client = self
            .client_certificate_chain
            .as_ref()
            .ok_or_else(|| S2aTrustError::Config("client_certificate_chain is not set".into()))?;
        let server = self
            .server_certificate_chain
            .as_ref()
            .ok_or_else(|| S2aTrustError::Config("server_certificate_chain is not set".into()))?;

        PolicySnapshot::builder()
            .client_chain(CertificateChain::from_pem_file(client)?)
            .server_chain(CertificateChain::from_pem_file(server)?)
            .server_policy(self.server_policy.into())
            .build()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_streams: self.max_streams_per_connection,
            max_frame_size: self.max_frame_size,
            ..ConnectionConfig::default()
        }
    }
}
