// Session protocol wire messages.
//
// Declared by hand with prost derives. Field numbers follow the S2A v2
// session protos so that payloads interoperate with other implementations.
// Each DATA frame on a session stream carries exactly one encoded message.

use prost::Message;

// ── Enumerations ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ConnectionSide {
    Unspecified = 0,
    Client = 1,
    Server = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TlsVersion {
    Unspecified = 0,
    Tls10 = 1,
    Tls11 = 2,
    Tls12 = 3,
    Tls13 = 4,
}

/// Handshake suites, only meaningful below TLS 1.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum HandshakeCiphersuite {
    Unspecified = 0,
    EcdheEcdsaWithAes128GcmSha256 = 1,
    EcdheEcdsaWithAes256GcmSha384 = 2,
    EcdheEcdsaWithChacha20Poly1305Sha256 = 3,
    EcdheRsaWithAes128GcmSha256 = 4,
    EcdheRsaWithAes256GcmSha384 = 5,
    EcdheRsaWithChacha20Poly1305Sha256 = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RecordCiphersuite {
    Unspecified = 0,
    Aes128GcmSha256 = 1,
    Aes256GcmSha384 = 2,
    Chacha20Poly1305Sha256 = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RequestClientCertificate {
    Unspecified = 0,
    DontRequest = 1,
    RequestButDontVerify = 2,
    RequestAndVerify = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PrivateKeyOperation {
    Unspecified = 0,
    Sign = 1,
    Decrypt = 2,
}

/// Status codes carried in [`Status::code`]. Callers should only rely on
/// zero versus non-zero; the specific values read like gRPC codes in logs.
pub mod status_code {
    pub const OK: u32 = 0;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const UNIMPLEMENTED: u32 = 12;
    pub const INTERNAL: u32 = 13;
    pub const UNAVAILABLE: u32 = 14;
    pub const UNAUTHENTICATED: u32 = 16;
}

// ── Authentication ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Identity {
    #[prost(oneof = "identity::IdentityOneof", tags = "1, 2, 4")]
    pub identity_oneof: Option<identity::IdentityOneof>,
}

pub mod identity {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum IdentityOneof {
        #[prost(string, tag = "1")]
        SpiffeId(String),
        #[prost(string, tag = "2")]
        Hostname(String),
        #[prost(string, tag = "4")]
        Uid(String),
    }
}

/// One credential proof attached to a request.
#[derive(Clone, PartialEq, Message)]
pub struct AuthenticationMechanism {
    /// Identity the caller claims; carried but not evaluated.
    #[prost(message, optional, tag = "1")]
    pub identity: Option<Identity>,
    #[prost(oneof = "authentication_mechanism::MechanismOneof", tags = "2")]
    pub mechanism_oneof: Option<authentication_mechanism::MechanismOneof>,
}

pub mod authentication_mechanism {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum MechanismOneof {
        #[prost(string, tag = "2")]
        Token(String),
    }
}

impl AuthenticationMechanism {
    /// A mechanism carrying an opaque token.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            identity: None,
            mechanism_oneof: Some(authentication_mechanism::MechanismOneof::Token(token.into())),
        }
    }

    /// A mechanism carrying only an identity claim.
    pub fn identity(identity: identity::IdentityOneof) -> Self {
        Self {
            identity: Some(Identity {
                identity_oneof: Some(identity),
            }),
            mechanism_oneof: None,
        }
    }

    /// The token, if this mechanism carries one.
    pub fn token_str(&self) -> Option<&str> {
        match &self.mechanism_oneof {
            Some(authentication_mechanism::MechanismOneof::Token(t)) => Some(t),
            None => None,
        }
    }
}

// ── Requests ────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Status {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub details: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetTlsConfigurationReq {
    #[prost(enumeration = "ConnectionSide", tag = "1")]
    pub connection_side: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct OffloadPrivateKeyOperationReq {
    #[prost(enumeration = "PrivateKeyOperation", tag = "1")]
    pub operation: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub in_bytes: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionReq {
    #[prost(message, repeated, tag = "2")]
    pub authentication_mechanisms: Vec<AuthenticationMechanism>,
    #[prost(oneof = "session_req::ReqOneof", tags = "3, 4")]
    pub req_oneof: Option<session_req::ReqOneof>,
}

pub mod session_req {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum ReqOneof {
        #[prost(message, tag = "3")]
        GetTlsConfigurationReq(super::GetTlsConfigurationReq),
        #[prost(message, tag = "4")]
        OffloadPrivateKeyOperationReq(super::OffloadPrivateKeyOperationReq),
    }
}

impl SessionReq {
    /// A TLS configuration request for `side`.
    pub fn get_tls_configuration(
        side: ConnectionSide,
        authentication_mechanisms: Vec<AuthenticationMechanism>,
    ) -> Self {
        Self {
            authentication_mechanisms,
            req_oneof: Some(session_req::ReqOneof::GetTlsConfigurationReq(
                GetTlsConfigurationReq {
                    connection_side: side as i32,
                },
            )),
        }
    }

    /// Variant name used in logs.
    pub fn kind(&self) -> &'static str {
        match &self.req_oneof {
            Some(session_req::ReqOneof::GetTlsConfigurationReq(_)) => "get_tls_configuration",
            Some(session_req::ReqOneof::OffloadPrivateKeyOperationReq(_)) => {
                "offload_private_key_operation"
            }
            None => "unset",
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ClientTlsConfiguration {
    /// PEM certificates, leaf first.
    #[prost(string, repeated, tag = "1")]
    pub certificate_chain: Vec<String>,
    #[prost(enumeration = "TlsVersion", tag = "2")]
    pub min_tls_version: i32,
    #[prost(enumeration = "TlsVersion", tag = "3")]
    pub max_tls_version: i32,
    #[prost(enumeration = "HandshakeCiphersuite", repeated, tag = "4")]
    pub handshake_ciphersuites: Vec<i32>,
    /// Most preferred first.
    #[prost(enumeration = "RecordCiphersuite", repeated, tag = "5")]
    pub record_ciphersuites: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerTlsConfiguration {
    #[prost(string, repeated, tag = "1")]
    pub certificate_chain: Vec<String>,
    #[prost(enumeration = "TlsVersion", tag = "2")]
    pub min_tls_version: i32,
    #[prost(enumeration = "TlsVersion", tag = "3")]
    pub max_tls_version: i32,
    #[prost(enumeration = "HandshakeCiphersuite", repeated, tag = "4")]
    pub handshake_ciphersuites: Vec<i32>,
    #[prost(enumeration = "RecordCiphersuite", repeated, tag = "5")]
    pub record_ciphersuites: Vec<i32>,
    #[prost(bool, tag = "6")]
    pub tls_resumption_enabled: bool,
    #[prost(enumeration = "RequestClientCertificate", tag = "7")]
    pub request_client_certificate: i32,
    /// Per-record bytes session-ticket encryption may add.
    #[prost(uint32, tag = "8")]
    pub max_overhead_of_ticket_aead: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetTlsConfigurationResp {
    #[prost(oneof = "get_tls_configuration_resp::TlsConfiguration", tags = "1, 2")]
    pub tls_configuration: Option<get_tls_configuration_resp::TlsConfiguration>,
}

pub mod get_tls_configuration_resp {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum TlsConfiguration {
        #[prost(message, tag = "1")]
        ClientTlsConfiguration(super::ClientTlsConfiguration),
        #[prost(message, tag = "2")]
        ServerTlsConfiguration(super::ServerTlsConfiguration),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionResp {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(oneof = "session_resp::RespOneof", tags = "2")]
    pub resp_oneof: Option<session_resp::RespOneof>,
}

pub mod session_resp {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum RespOneof {
        #[prost(message, tag = "2")]
        GetTlsConfigurationResp(super::GetTlsConfigurationResp),
    }
}

impl SessionResp {
    /// A successful response carrying `configuration`.
    pub fn tls_configuration(configuration: get_tls_configuration_resp::TlsConfiguration) -> Self {
        Self {
            status: Some(Status {
                code: status_code::OK,
                details: String::new(),
            }),
            resp_oneof: Some(session_resp::RespOneof::GetTlsConfigurationResp(
                GetTlsConfigurationResp {
                    tls_configuration: Some(configuration),
                },
            )),
        }
    }

    /// A failure response. Never carries a payload.
    pub fn failure(code: u32, details: impl Into<String>) -> Self {
        debug_assert_ne!(code, status_code::OK);
        Self {
            status: Some(Status {
                code,
                details: details.into(),
            }),
            resp_oneof: None,
        }
    }

    /// Status code, treating a missing status as success.
    pub fn code(&self) -> u32 {
        self.status.as_ref().map_or(status_code::OK, |s| s.code)
    }

    pub fn details(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.details.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.code() == status_code::OK
    }

    /// The TLS configuration payload, if any.
    pub fn tls_configuration_ref(&self) -> Option<&get_tls_configuration_resp::TlsConfiguration> {
        match &self.resp_oneof {
            Some(session_resp::RespOneof::GetTlsConfigurationResp(resp)) => {
                resp.tls_configuration.as_ref()
            }
            None => None,
        }
    }
}
