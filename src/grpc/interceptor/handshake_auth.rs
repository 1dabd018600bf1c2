//! Handshake-token authentication
//!
//! Calls present the token issued by the handshake under `auth-token-bin`.
//! The handshake call itself is exempt on the streaming path.

use super::{CallInfo, CallInterceptor, StreamAuth, AUTH_TOKEN_HEADER, HANDSHAKE_METHOD_SUFFIX};
use crate::context::CallContext;
use crate::error::AuthError;
use crate::grpc::handshake::ServerAuthHandler;
use crate::grpc::stream::StreamMetadata;
use crate::identity::attach_identity;
use crate::telemetry::metrics::record_auth_attempt;
use async_trait::async_trait;
use prost::bytes::Bytes;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Status;

const SCHEME: &str = "handshake";

/// Interceptor validating handshake-issued tokens
///
/// Built either around an authenticator or, for open access, with
/// [`HandshakeAuthInterceptor::disabled`].
#[derive(Clone)]
pub struct HandshakeAuthInterceptor {
    authenticator: Option<Arc<dyn ServerAuthHandler>>,
    handshake_suffix: String,
}

impl HandshakeAuthInterceptor {
    pub fn new(authenticator: Arc<dyn ServerAuthHandler>) -> Self {
        Self {
            authenticator: Some(authenticator),
            handshake_suffix: HANDSHAKE_METHOD_SUFFIX.to_string(),
        }
    }

    /// An interceptor that lets every call through unauthenticated
    ///
    /// Handlers see the original context and no identity. Any client can
    /// reach every method, so only install this where the transport or
    /// network already restricts who can connect.
    pub fn disabled() -> Self {
        Self {
            authenticator: None,
            handshake_suffix: HANDSHAKE_METHOD_SUFFIX.to_string(),
        }
    }

    /// Override the method suffix identifying handshake calls
    pub fn with_handshake_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.handshake_suffix = suffix.into();
        self
    }

    pub fn handshake_suffix(&self) -> &str {
        &self.handshake_suffix
    }

    pub fn authenticator(&self) -> Option<&Arc<dyn ServerAuthHandler>> {
        self.authenticator.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.authenticator.is_some()
    }
}

/// First `auth-token-bin` value, empty when absent
fn token_from_metadata(metadata: &MetadataMap) -> Result<Bytes, AuthError> {
    match metadata.get_bin(AUTH_TOKEN_HEADER) {
        Some(value) => value.to_bytes().map_err(|_| AuthError::InvalidBinaryToken),
        None => Ok(Bytes::new()),
    }
}

#[async_trait]
impl CallInterceptor for HandshakeAuthInterceptor {
    async fn intercept_unary(
        &self,
        ctx: CallContext,
        info: &CallInfo,
    ) -> Result<CallContext, Status> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(ctx);
        };

        let token = token_from_metadata(ctx.metadata())?;
        match authenticator.is_valid(&token).await {
            Ok(identity) => {
                tracing::debug!(method = %info.full_method(), scheme = SCHEME, "gRPC call authenticated");
                record_auth_attempt(SCHEME, "unary", "success");
                Ok(attach_identity(&ctx, identity))
            }
            Err(err) => {
                tracing::warn!(method = %info.full_method(), scheme = SCHEME, reason = %err.message(), "gRPC call rejected");
                record_auth_attempt(SCHEME, "unary", "rejected");
                Err(Status::permission_denied(format!(
                    "auth-error: {}",
                    err.message()
                )))
            }
        }
    }

    async fn intercept_stream(
        &self,
        stream: &mut dyn StreamMetadata,
        info: &CallInfo,
    ) -> Result<StreamAuth, Status> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(StreamAuth::Passthrough);
        };

        if info.is_handshake(&self.handshake_suffix) {
            return Ok(StreamAuth::Passthrough);
        }

        let token = token_from_metadata(stream.context().metadata())?;
        match authenticator.is_valid(&token).await {
            Ok(identity) => {
                tracing::debug!(method = %info.full_method(), scheme = SCHEME, "gRPC stream authenticated");
                record_auth_attempt(SCHEME, "stream", "success");
                Ok(StreamAuth::Authenticated(attach_identity(
                    stream.context(),
                    identity,
                )))
            }
            Err(err) => {
                tracing::warn!(method = %info.full_method(), scheme = SCHEME, reason = %err.message(), "gRPC stream rejected");
                record_auth_attempt(SCHEME, "stream", "rejected");
                Err(Status::unauthenticated(format!(
                    "auth-error: {}",
                    err.message()
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        if self.is_enabled() {
            SCHEME
        } else {
            "none"
        }
    }
}
