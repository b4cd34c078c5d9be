// S2ATrust - security agent session protocol
//
// Crate root: module declarations and public re-exports.
//
// A caller opens a session stream, authenticates, and asks which TLS
// configuration to use for one connection side. `Session` serves that
// exchange for any `SessionAgent`; `PolicyAgent` answers from configured
// certificate material and `FakeAgent` from fixed test certificates.

pub mod agent;
pub mod auth;
pub mod certs;
pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod policy;
pub mod proto;
pub mod server;
pub mod session;

// Re-export key types at crate root for convenience.
pub use agent::{PolicyAgent, ResolveError, SessionAgent};
pub use certs::CertificateChain;
pub use client::SessionClient;
pub use config::AgentConfig;
pub use error::{Result, S2aTrustError};
pub use fake::FakeAgent;
pub use policy::{PolicySnapshot, Side};
pub use server::{AgentServer, RunningServer, ServerConfig};
pub use session::{Session, SessionState};
