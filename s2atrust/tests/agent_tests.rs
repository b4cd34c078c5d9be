//! Serving non-fake agents: policy from configuration, and failing resolvers.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use s2astream::ConnectionConfig;
use s2atrust::auth::Caller;
use s2atrust::client::{self, token_mechanism};
use s2atrust::proto::get_tls_configuration_resp::TlsConfiguration;
use s2atrust::proto::status_code;
use s2atrust::{
    AgentConfig, AgentServer, PolicyAgent, ResolveError, S2aTrustError, ServerConfig,
    SessionAgent, SessionClient, Side,
};

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Resolver whose backing store is down.
struct UnavailableAgent;

#[async_trait]
impl SessionAgent for UnavailableAgent {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn resolve(
        &self,
        _caller: &Caller,
        _side: Side,
    ) -> Result<TlsConfiguration, ResolveError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(ResolveError::Unavailable("trust store unreachable".into()))
    }
}

#[tokio::test]
async fn policy_agent_from_config_file() {
    let testdata = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata");
    let json = serde_json::json!({
        "client_certificate_chain": testdata.join("chain.pem"),
        "server_certificate_chain": testdata.join("server_cert.pem"),
        "max_streams_per_connection": 8,
        "server_policy": {
            "tls_resumption_enabled": true,
            "request_client_certificate": "DONT_REQUEST",
            "max_overhead_of_ticket_aead": 16
        }
    });
    let config = AgentConfig::from_json_str(&json.to_string()).unwrap();
    let agent = Arc::new(PolicyAgent::from_config(&config).unwrap());

    let server = AgentServer::new(agent, ServerConfig::from(&config))
        .spawn(config.listen_addr)
        .await
        .unwrap();
    let conn = client::connect(server.local_addr(), ConnectionConfig::default())
        .await
        .unwrap();
    let mut session = SessionClient::open(&conn).await.unwrap();

    let TlsConfiguration::ClientTlsConfiguration(client_cfg) = session
        .get_tls_configuration(Side::Client, vec![token_mechanism("token")])
        .await
        .unwrap()
    else {
        panic!("expected client configuration");
    };
    assert_eq!(client_cfg.certificate_chain.len(), 2);

    let TlsConfiguration::ServerTlsConfiguration(server_cfg) = session
        .get_tls_configuration(Side::Server, vec![token_mechanism("token")])
        .await
        .unwrap()
    else {
        panic!("expected server configuration");
    };
    assert!(server_cfg.tls_resumption_enabled);
    assert_eq!(server_cfg.max_overhead_of_ticket_aead, 16);

    session.finish().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn unavailable_resolver_is_a_distinct_failure() {
    let server = AgentServer::new(Arc::new(UnavailableAgent), ServerConfig::default())
        .spawn(loopback())
        .await
        .unwrap();
    let conn = client::connect(server.local_addr(), ConnectionConfig::default())
        .await
        .unwrap();
    let mut session = SessionClient::open(&conn).await.unwrap();

    for _ in 0..2 {
        let err = session
            .get_tls_configuration(Side::Server, vec![token_mechanism("token")])
            .await
            .unwrap_err();
        let S2aTrustError::Status { code, details } = err else {
            panic!("expected a status error, got {err:?}");
        };
        assert_eq!(code, status_code::UNAVAILABLE);
        assert!(details.contains("unavailable"));
    }

    // Authentication is still checked first.
    let err = session
        .get_tls_configuration(Side::Server, vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        S2aTrustError::Status {
            code: status_code::UNAUTHENTICATED,
            ..
        }
    ));

    session.finish().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn dyn_agent_can_be_served() {
    let agent: Arc<dyn SessionAgent> = Arc::new(s2atrust::FakeAgent::new().unwrap());
    let server = AgentServer::new(agent, ServerConfig::default())
        .spawn(loopback())
        .await
        .unwrap();
    let conn = client::connect(server.local_addr(), ConnectionConfig::default())
        .await
        .unwrap();
    let mut session = SessionClient::open(&conn).await.unwrap();
    session
        .get_tls_configuration(Side::Client, vec![token_mechanism("token")])
        .await
        .unwrap();
    server.stop().await.unwrap();
}
