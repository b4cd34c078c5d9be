// Session protocol client.
//
// Sends one request at a time on a channel and interprets the response,
// checking it against the response contract before handing it out.

use std::net::SocketAddr;

use bytes::Bytes;
use prost::Message;
use s2astream::{BiStream, Channel, ClientConnection, Connection, ConnectionConfig};
use tokio::net::TcpStream;

use crate::error::{Result, S2aTrustError};
use crate::policy::{check_contract, Side};
use crate::proto::get_tls_configuration_resp::TlsConfiguration;
use crate::proto::session_resp::RespOneof;
use crate::proto::{AuthenticationMechanism, SessionReq, SessionResp};

/// A token mechanism, the credential every agent accepts.
pub fn token_mechanism(token: impl Into<String>) -> AuthenticationMechanism {
    AuthenticationMechanism::token(token)
}

/// Connect to an agent over TCP.
pub async fn connect(addr: SocketAddr, config: ConnectionConfig) -> Result<ClientConnection> {
    let socket = TcpStream::connect(addr).await?;
    socket.set_nodelay(true)?;
    tracing::debug!(%addr, "connected to agent");
    Ok(Connection::client(socket, config))
}

/// Client end of one session stream.
pub struct SessionClient<C> {
    channel: C,
}

impl SessionClient<BiStream> {
    /// Open a new session stream on `connection`.
    pub async fn open(connection: &ClientConnection) -> Result<Self> {
        Ok(Self::new(connection.open_stream().await?))
    }
}

impl<C: Channel> SessionClient<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Send one request and wait for its response, whatever its status.
    pub async fn exchange(&mut self, request: &SessionReq) -> Result<SessionResp> {
        self.channel
            .send(Bytes::from(request.encode_to_vec()))
            .await?;
        match self.channel.recv().await? {
            Some(payload) => Ok(SessionResp::decode(payload)?),
            None => Err(S2aTrustError::StreamEnded),
        }
    }

    /// Ask for the TLS configuration to use as `side`.
    ///
    /// A failure status becomes [`S2aTrustError::Status`]; a success without
    /// a matching, well-formed configuration becomes
    /// [`S2aTrustError::ContractViolation`].
    pub async fn get_tls_configuration(
        &mut self,
        side: Side,
        authentication_mechanisms: Vec<AuthenticationMechanism>,
    ) -> Result<TlsConfiguration> {
        let request = SessionReq::get_tls_configuration(side.into(), authentication_mechanisms);
        let response = self.exchange(&request).await?;
        if !response.is_ok() {
            return Err(S2aTrustError::Status {
                code: response.code(),
                details: response.details().to_string(),
            });
        }

        let configuration = match response.resp_oneof {
            Some(RespOneof::GetTlsConfigurationResp(resp)) => resp.tls_configuration,
            None => None,
        }
        .ok_or_else(|| {
            S2aTrustError::ContractViolation("successful response without a configuration".into())
        })?;
        check_contract(side, &configuration)?;
        Ok(configuration)
    }

    /// Finish the sending side and wait for the agent to finish its own.
    pub async fn finish(&mut self) -> Result<()> {
        self.channel.finish().await?;
        while self.channel.recv().await?.is_some() {
            tracing::debug!("discarding unsolicited session response");
        }
        Ok(())
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use s2astream::transport::memory;

    use super::*;
    use crate::fake::FakeAgent;
    use crate::proto::{status_code, ClientTlsConfiguration, GetTlsConfigurationResp};
    use crate::session::Session;

    fn serve_fake() -> SessionClient<memory::MemoryChannel> {
        let (client, server) = memory::pair(4);
        let agent = Arc::new(FakeAgent::new().unwrap());
        tokio::spawn(Session::new(server, agent).run());
        SessionClient::new(client)
    }

    #[tokio::test]
    async fn fetches_both_sides() {
        let mut client = serve_fake();
        let cfg = client
            .get_tls_configuration(Side::Client, vec![token_mechanism("token")])
            .await
            .unwrap();
        assert_eq!(Side::of(&cfg), Side::Client);
        let cfg = client
            .get_tls_configuration(Side::Server, vec![token_mechanism("token")])
            .await
            .unwrap();
        assert_eq!(Side::of(&cfg), Side::Server);
        client.finish().await.unwrap();
    }

    #[tokio::test]
    async fn failure_status_is_an_error() {
        let mut client = serve_fake();
        let err = client
            .get_tls_configuration(Side::Client, vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            S2aTrustError::Status {
                code: status_code::UNAUTHENTICATED,
                ..
            }
        ));
    }

    /// Replies with a fixed response to whatever arrives.
    fn canned(response: SessionResp) -> SessionClient<memory::MemoryChannel> {
        let (client, mut server) = memory::pair(4);
        tokio::spawn(async move {
            while let Ok(Some(_)) = server.recv().await {
                server
                    .send(Bytes::from(response.encode_to_vec()))
                    .await
                    .unwrap();
            }
        });
        SessionClient::new(client)
    }

    #[tokio::test]
    async fn wrong_variant_is_a_contract_violation() {
        let fake = FakeAgent::new().unwrap();
        let mut client = canned(SessionResp::tls_configuration(
            fake.snapshot().resolve(Side::Client),
        ));
        let err = client
            .get_tls_configuration(Side::Server, vec![token_mechanism("t")])
            .await
            .unwrap_err();
        assert!(matches!(err, S2aTrustError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn success_without_payload_is_a_contract_violation() {
        let mut client = canned(SessionResp {
            status: None,
            resp_oneof: Some(RespOneof::GetTlsConfigurationResp(
                GetTlsConfigurationResp::default(),
            )),
        });
        let err = client
            .get_tls_configuration(Side::Client, vec![token_mechanism("t")])
            .await
            .unwrap_err();
        assert!(matches!(err, S2aTrustError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn empty_configuration_is_a_contract_violation() {
        let mut client = canned(SessionResp::tls_configuration(
            TlsConfiguration::ClientTlsConfiguration(ClientTlsConfiguration::default()),
        ));
        let err = client
            .get_tls_configuration(Side::Client, vec![token_mechanism("t")])
            .await
            .unwrap_err();
        assert!(matches!(err, S2aTrustError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn stream_end_before_response() {
        let (client, mut server) = memory::pair(4);
        tokio::spawn(async move {
            let _ = server.recv().await;
            server.finish().await.unwrap();
            // Keep the end alive so the client sees a clean finish.
            let _ = server.recv().await;
        });
        let mut client = SessionClient::new(client);
        let err = client
            .get_tls_configuration(Side::Client, vec![token_mechanism("t")])
            .await
            .unwrap_err();
        assert!(matches!(err, S2aTrustError::StreamEnded));
    }
}
