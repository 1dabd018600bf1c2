//! Handshake exchange between a client and a pluggable authenticator

use super::proto::{HandshakeRequest, HandshakeResponse};
use super::stream::ServerStream;
use crate::error::AuthError;
use crate::identity::PeerIdentity;
use async_trait::async_trait;
use prost::bytes::Bytes;
use tonic::Status;

/// Payload-only view of a handshake stream
///
/// Authenticators exchange raw bytes and never see the handshake envelope.
#[async_trait]
pub trait AuthConn: Send {
    /// Wait for the next payload from the peer
    ///
    /// A peer that closes the stream yields [`AuthError::StreamClosed`].
    async fn read(&mut self) -> Result<Bytes, AuthError>;

    /// Send one payload to the peer
    async fn send(&mut self, payload: Bytes) -> Result<(), AuthError>;
}

/// Authenticator driving the handshake and validating the tokens it issues
///
/// Tokens are expected on later calls under the `auth-token-bin` metadata
/// key, where the interceptor hands them to [`ServerAuthHandler::is_valid`].
/// Both methods are called concurrently from independent calls.
#[async_trait]
pub trait ServerAuthHandler: Send + Sync {
    /// Run the exchange for one handshake call
    async fn authenticate(&self, conn: &mut dyn AuthConn) -> Result<(), Status>;

    /// Resolve a previously issued token into the caller's identity
    async fn is_valid(&self, token: &[u8]) -> Result<PeerIdentity, Status>;
}

/// [`AuthConn`] over a handshake server stream
pub struct ServerAuthConn<S> {
    stream: S,
}

impl<S> ServerAuthConn<S>
where
    S: ServerStream<Inbound = HandshakeRequest, Outbound = HandshakeResponse>,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> AuthConn for ServerAuthConn<S>
where
    S: ServerStream<Inbound = HandshakeRequest, Outbound = HandshakeResponse>,
{
    async fn read(&mut self) -> Result<Bytes, AuthError> {
        match self.stream.recv_message().await? {
            Some(request) => Ok(request.payload),
            None => Err(AuthError::StreamClosed),
        }
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), AuthError> {
        self.stream
            .send_message(HandshakeResponse {
                protocol_version: 0,
                payload,
            })
            .await?;
        Ok(())
    }
}

/// Handler body of the handshake call
///
/// Without an authenticator the handshake succeeds without any exchange.
pub async fn handshake_handler<S>(
    authenticator: Option<&dyn ServerAuthHandler>,
    stream: S,
) -> Result<(), Status>
where
    S: ServerStream<Inbound = HandshakeRequest, Outbound = HandshakeResponse>,
{
    let Some(authenticator) = authenticator else {
        return Ok(());
    };

    let mut conn = ServerAuthConn::new(stream);
    authenticator.authenticate(&mut conn).await
}
