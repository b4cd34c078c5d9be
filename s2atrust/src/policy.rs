// TLS policy snapshot and the connection-side configuration resolver.
//
// The snapshot is built once at startup and never mutated; concurrent
// sessions share it through an `Arc` and resolve against it without locking.

use std::fmt;

use crate::certs::CertificateChain;
use crate::error::{Result, S2aTrustError};
use crate::proto::get_tls_configuration_resp::TlsConfiguration;
use crate::proto::{
    ClientTlsConfiguration, ConnectionSide, HandshakeCiphersuite, RecordCiphersuite,
    RequestClientCertificate, ServerTlsConfiguration, TlsVersion,
};

/// The only protocol version handed out, as both minimum and maximum.
pub const PINNED_TLS_VERSION: TlsVersion = TlsVersion::Tls13;

/// Record protection suites, most preferred first.
pub const RECORD_CIPHERSUITES: [RecordCiphersuite; 3] = [
    RecordCiphersuite::Aes128GcmSha256,
    RecordCiphersuite::Aes256GcmSha384,
    RecordCiphersuite::Chacha20Poly1305Sha256,
];

/// TLS 1.3 negotiates handshake suites implicitly.
pub const HANDSHAKE_CIPHERSUITES: [HandshakeCiphersuite; 0] = [];

/// The side of a TLS connection a configuration is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Server,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
        }
    }
}

impl TryFrom<ConnectionSide> for Side {
    /// The rejected wire value.
    type Error = ConnectionSide;

    fn try_from(side: ConnectionSide) -> std::result::Result<Self, ConnectionSide> {
        match side {
            ConnectionSide::Client => Ok(Side::Client),
            ConnectionSide::Server => Ok(Side::Server),
            ConnectionSide::Unspecified => Err(side),
        }
    }
}

impl From<Side> for ConnectionSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Client => ConnectionSide::Client,
            Side::Server => ConnectionSide::Server,
        }
    }
}

impl Side {
    /// The side a configuration variant belongs to.
    pub fn of(configuration: &TlsConfiguration) -> Side {
        match configuration {
            TlsConfiguration::ClientTlsConfiguration(_) => Side::Client,
            TlsConfiguration::ServerTlsConfiguration(_) => Side::Server,
        }
    }
}

/// Server-only policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPolicy {
    pub tls_resumption_enabled: bool,
    pub request_client_certificate: RequestClientCertificate,
    pub max_overhead_of_ticket_aead: u32,
}

impl Default for ServerPolicy {
    /// Mutual TLS, no resumption, no ticket overhead budget.
    fn default() -> Self {
        Self {
            tls_resumption_enabled: false,
            request_client_certificate: RequestClientCertificate::RequestAndVerify,
            max_overhead_of_ticket_aead: 0,
        }
    }
}

/// Immutable certificate and policy material served to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    client_chain: CertificateChain,
    server_chain: CertificateChain,
    server: ServerPolicy,
}

impl PolicySnapshot {
    pub fn builder() -> PolicySnapshotBuilder {
        PolicySnapshotBuilder::default()
    }

    pub fn client_chain(&self) -> &CertificateChain {
        &self.client_chain
    }

    pub fn server_chain(&self) -> &CertificateChain {
        &self.server_chain
    }

    pub fn server_policy(&self) -> ServerPolicy {
        self.server
    }

    /// Build the complete configuration for `side`. Pure: the same side
    /// always yields an identical value.
    pub fn resolve(&self, side: Side) -> TlsConfiguration {
        let min_tls_version = PINNED_TLS_VERSION as i32;
        let max_tls_version = PINNED_TLS_VERSION as i32;
        let handshake_ciphersuites = HANDSHAKE_CIPHERSUITES.iter().map(|c| *c as i32).collect();
        let record_ciphersuites = RECORD_CIPHERSUITES.iter().map(|c| *c as i32).collect();

        match side {
            Side::Client => TlsConfiguration::ClientTlsConfiguration(ClientTlsConfiguration {
                certificate_chain: self.client_chain.to_strings(),
                min_tls_version,
                max_tls_version,
                handshake_ciphersuites,
                record_ciphersuites,
            }),
            Side::Server => TlsConfiguration::ServerTlsConfiguration(ServerTlsConfiguration {
                certificate_chain: self.server_chain.to_strings(),
                min_tls_version,
                max_tls_version,
                handshake_ciphersuites,
                record_ciphersuites,
                tls_resumption_enabled: self.server.tls_resumption_enabled,
                request_client_certificate: self.server.request_client_certificate as i32,
                max_overhead_of_ticket_aead: self.server.max_overhead_of_ticket_aead,
            }),
        }
    }
}

/// Check a configuration produced for `side` against the response contract:
/// matching variant, `min <= max`, non-empty chain and record suites.
pub fn check_contract(side: Side, configuration: &TlsConfiguration) -> Result<()> {
    let actual = Side::of(configuration);
    if actual != side {
        return Err(S2aTrustError::ContractViolation(format!(
            "{side} request answered with a {actual} configuration"
        )));
    }

    let (chain, min, max, records) = match configuration {
        TlsConfiguration::ClientTlsConfiguration(c) => (
            &c.certificate_chain,
            c.min_tls_version,
            c.max_tls_version,
            &c.record_ciphersuites,
        ),
        TlsConfiguration::ServerTlsConfiguration(c) => (
            &c.certificate_chain,
            c.min_tls_version,
            c.max_tls_version,
            &c.record_ciphersuites,
        ),
    };
    if chain.is_empty() {
        return Err(S2aTrustError::ContractViolation(
            "empty certificate chain".into(),
        ));
    }
    if min == TlsVersion::Unspecified as i32 || min > max {
        return Err(S2aTrustError::ContractViolation(format!(
            "invalid tls version range {min}..={max}"
        )));
    }
    if records.is_empty() {
        return Err(S2aTrustError::ContractViolation(
            "no record ciphersuites".into(),
        ));
    }
    Ok(())
}

/// Builder for a [`PolicySnapshot`].
///
/// # Example
/// ```ignore
/// let snapshot = PolicySnapshot::builder()
///     .client_chain(CertificateChain::from_pem(CLIENT_PEM)?)
///     .server_chain(CertificateChain::from_pem(SERVER_PEM)?)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct PolicySnapshotBuilder {
    client_chain: Option<CertificateChain>,
    server_chain: Option<CertificateChain>,
    server: ServerPolicy,
}

impl PolicySnapshotBuilder {
    /// Chain handed to callers acting as TLS clients.
    pub fn client_chain(mut self, chain: CertificateChain) -> Self {
        self.client_chain = Some(chain);
        self
    }

    /// Chain handed to callers acting as TLS servers.
    pub fn server_chain(mut self, chain: CertificateChain) -> Self {
        self.server_chain = Some(chain);
        self
    }

    pub fn tls_resumption_enabled(mut self, enabled: bool) -> Self {
        self.server.tls_resumption_enabled = enabled;
        self
    }

    pub fn request_client_certificate(mut self, policy: RequestClientCertificate) -> Self {
        self.server.request_client_certificate = policy;
        self
    }

    pub fn max_overhead_of_ticket_aead(mut self, bytes: u32) -> Self {
        self.server.max_overhead_of_ticket_aead = bytes;
        self
    }

    /// Replace all server knobs at once.
    pub fn server_policy(mut self, policy: ServerPolicy) -> Self {
        self.server = policy;
        self
    }

    /// Validate and freeze the snapshot.
    pub fn build(self) -> Result<PolicySnapshot> {
        let client_chain = self
            .client_chain
            .filter(|c| !c.is_empty())
            .ok_or_else(|| S2aTrustError::Policy("client certificate chain is required".into()))?;
        let server_chain = self
            .server_chain
            .filter(|c| !c.is_empty())
            .ok_or_else(|| S2aTrustError::Policy("server certificate chain is required".into()))?;
        if self.server.request_client_certificate == RequestClientCertificate::Unspecified {
            return Err(S2aTrustError::Policy(
                "client certificate request policy must be specified".into(),
            ));
        }

        Ok(PolicySnapshot {
            client_chain,
            server_chain,
            server: self.server,
        })
    }
}
