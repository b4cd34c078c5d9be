// Session protocol state machine.
//
// One `Session` serves one stream. Requests are handled strictly one at a
// time: each produces exactly one response before the next is read, so
// responses leave in request order.
//
//   StreamOpen -> Validating -> Resolving -> Responding -> StreamOpen
//                     |                         ^
//                     +-------------------------+   (rejected request)
//
// Any state may move to StreamClosed on peer finish, cancellation, or a
// transport failure.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use s2astream::Channel;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::SessionAgent;
use crate::auth::Caller;
use crate::error::{Result, S2aTrustError};
use crate::policy::{check_contract, Side};
use crate::proto::session_req::ReqOneof;
use crate::proto::{status_code, SessionReq, SessionResp};

/// Session protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next request.
    StreamOpen,
    /// Decoding the request and checking its credentials and variant.
    Validating,
    /// Waiting on the agent for a configuration.
    Resolving,
    /// Writing the response.
    Responding,
    /// Terminal.
    StreamClosed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::StreamOpen => write!(f, "StreamOpen"),
            SessionState::Validating => write!(f, "Validating"),
            SessionState::Resolving => write!(f, "Resolving"),
            SessionState::Responding => write!(f, "Responding"),
            SessionState::StreamClosed => write!(f, "StreamClosed"),
        }
    }
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (StreamOpen, Validating)
                | (Validating, Resolving)
                | (Validating, Responding)
                | (Resolving, Responding)
                | (Responding, StreamOpen)
                | (StreamOpen | Validating | Resolving | Responding, StreamClosed)
        )
    }

    /// The next state, or an error if the move is not allowed.
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(S2aTrustError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// How a session that ended cleanly went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub stream_id: u32,
    /// Responses written, failures included.
    pub responses: u64,
}

/// Serves the session protocol on one channel.
pub struct Session<C, A: ?Sized> {
    channel: C,
    agent: Arc<A>,
    state: SessionState,
    responses: u64,
}

impl<C, A> Session<C, A>
where
    C: Channel,
    A: SessionAgent + ?Sized,
{
    pub fn new(channel: C, agent: Arc<A>) -> Self {
        Self {
            channel,
            agent,
            state: SessionState::StreamOpen,
            responses: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve requests until the peer finishes the stream.
    ///
    /// Returns `Ok` when the peer finishes its side; the local side is
    /// finished in turn. Transport failures and peer cancellation end the
    /// session with an error. Request-level failures never do: they are
    /// answered with a failure status and the stream stays open.
    pub async fn run(mut self) -> Result<SessionSummary> {
        let span = tracing::debug_span!(
            "session",
            stream_id = self.channel.id(),
            agent = self.agent.name()
        );
        self.serve().instrument(span).await
    }

    async fn serve(&mut self) -> Result<SessionSummary> {
        let cancel = self.channel.cancellation();
        loop {
            let Some(payload) = self.channel.recv().await? else {
                self.transition(SessionState::StreamClosed)?;
                self.channel.finish().await?;
                tracing::debug!(responses = self.responses, "peer finished session");
                return Ok(SessionSummary {
                    stream_id: self.channel.id(),
                    responses: self.responses,
                });
            };

            let response = self.exchange(payload, &cancel).await?;

            self.transition(SessionState::Responding)?;
            if cancel.is_cancelled() {
                return Err(S2aTrustError::Cancelled);
            }
            self.channel.send(Bytes::from(response.encode_to_vec())).await?;
            self.responses += 1;
            tracing::debug!(
                request = self.responses,
                code = response.code(),
                "response sent"
            );
            self.transition(SessionState::StreamOpen)?;
        }
    }

    /// Validate and resolve one request, leaving the state just before
    /// `Responding`.
    async fn exchange(&mut self, payload: Bytes, cancel: &CancellationToken) -> Result<SessionResp> {
        self.transition(SessionState::Validating)?;

        let request = match SessionReq::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable request");
                return Ok(SessionResp::failure(
                    status_code::INVALID_ARGUMENT,
                    format!("malformed session request: {e}"),
                ));
            }
        };

        let (caller, side) = match check_request(&*self.agent, &request) {
            Ok(checked) => checked,
            Err(rejection) => return Ok(rejection),
        };

        self.transition(SessionState::Resolving)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%side, "resolution abandoned: stream cancelled");
                Err(S2aTrustError::Cancelled)
            }
            response = resolve(&*self.agent, &caller, side) => Ok(response),
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        self.state = self.state.transition(next)?;
        Ok(())
    }
}

/// Handle one request without a stream: validate, then resolve.
pub async fn process<A>(agent: &A, request: &SessionReq) -> SessionResp
where
    A: SessionAgent + ?Sized,
{
    match check_request(agent, request) {
        Ok((caller, side)) => resolve(agent, &caller, side).await,
        Err(rejection) => rejection,
    }
}

/// Credentials first, then the request variant. A rejection is returned as
/// the failure response to send.
fn check_request<A>(agent: &A, request: &SessionReq) -> std::result::Result<(Caller, Side), SessionResp>
where
    A: SessionAgent + ?Sized,
{
    let caller = agent
        .validate(&request.authentication_mechanisms)
        .map_err(|e| {
            tracing::debug!(
                mechanisms = request.authentication_mechanisms.len(),
                reason = %e,
                "request rejected"
            );
            SessionResp::failure(e.status_code(), e.to_string())
        })?;

    match &request.req_oneof {
        Some(ReqOneof::GetTlsConfigurationReq(req)) => {
            let side = Side::try_from(req.connection_side()).map_err(|_| {
                SessionResp::failure(
                    status_code::INVALID_ARGUMENT,
                    format!("unsupported connection side {}", req.connection_side),
                )
            })?;
            Ok((caller, side))
        }
        Some(ReqOneof::OffloadPrivateKeyOperationReq(_)) => Err(SessionResp::failure(
            status_code::UNIMPLEMENTED,
            format!("{} requests are not served", request.kind()),
        )),
        None => Err(SessionResp::failure(
            status_code::INVALID_ARGUMENT,
            "session request carries no request variant",
        )),
    }
}

async fn resolve<A>(agent: &A, caller: &Caller, side: Side) -> SessionResp
where
    A: SessionAgent + ?Sized,
{
    match agent.resolve(caller, side).await {
        Ok(configuration) => match check_contract(side, &configuration) {
            Ok(()) => SessionResp::tls_configuration(configuration),
            Err(e) => {
                tracing::warn!(%side, error = %e, "agent broke the response contract");
                SessionResp::failure(status_code::INTERNAL, e.to_string())
            }
        },
        Err(e) => {
            tracing::warn!(%side, error = %e, "resolution failed");
            SessionResp::failure(e.status_code(), e.to_string())
        }
    }
}
