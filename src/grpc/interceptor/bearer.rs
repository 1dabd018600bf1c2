//! Basic/Bearer authentication
//!
//! The handshake call presents `Basic base64(username:password)` and gets a
//! bearer token back in the `authorization` trailer. Every other call
//! presents `Bearer <token>`. Validator errors reach the client unchanged.

use super::{
    CallInfo, CallInterceptor, StreamAuth, AUTHORIZATION_HEADER, BASIC_AUTH_PREFIX,
    BEARER_TOKEN_PREFIX, HANDSHAKE_METHOD_SUFFIX,
};
use crate::context::CallContext;
use crate::error::AuthError;
use crate::grpc::stream::StreamMetadata;
use crate::identity::{attach_identity, PeerIdentity};
use crate::telemetry::metrics::record_auth_attempt;
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::sync::Arc;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::Status;

const SCHEME: &str = "basic_bearer";

/// Standard alphabet, padding optional
const BASIC_CREDENTIALS_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Checks Basic credentials and the bearer tokens issued for them
///
/// Both methods are called concurrently from independent calls; a token
/// issued by one call must be accepted by any later call.
#[async_trait]
pub trait BasicAuthValidator: Send + Sync {
    /// Check a username/password pair and issue a bearer token
    async fn validate(&self, username: &str, password: &str) -> Result<String, Status>;

    /// Resolve a previously issued bearer token into the caller's identity
    async fn is_valid(&self, bearer_token: &str) -> Result<PeerIdentity, Status>;
}

/// Interceptor implementing the Basic then Bearer scheme
#[derive(Clone)]
pub struct BearerTokenInterceptor {
    validator: Arc<dyn BasicAuthValidator>,
    handshake_suffix: String,
}

impl BearerTokenInterceptor {
    pub fn new(validator: Arc<dyn BasicAuthValidator>) -> Self {
        Self {
            validator,
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

    /// Exchange Basic credentials for a bearer token trailer
    async fn basic_handshake(
        &self,
        stream: &mut dyn StreamMetadata,
        credential: &str,
    ) -> Result<(), Status> {
        let (username, password) = decode_basic_credentials(credential)?;
        let token = self.validator.validate(&username, &password).await?;

        let value: MetadataValue<Ascii> = format!("{} {}", BEARER_TOKEN_PREFIX, token)
            .parse()
            .map_err(|_| AuthError::InvalidTokenValue)?;
        let mut trailer = MetadataMap::new();
        trailer.insert(AUTHORIZATION_HEADER, value);
        stream.set_trailer(trailer);
        Ok(())
    }

    async fn authorize_stream(
        &self,
        stream: &mut dyn StreamMetadata,
        info: &CallInfo,
    ) -> Result<StreamAuth, Status> {
        let header = stream
            .context()
            .metadata()
            .get(AUTHORIZATION_HEADER)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::MalformedCredentials)?
            .to_string();
        let (scheme, credential) = split_authorization(&header);

        if info.is_handshake(&self.handshake_suffix) {
            if scheme != BASIC_AUTH_PREFIX {
                return Err(AuthError::UnsupportedScheme(scheme.to_string()).into());
            }
            self.basic_handshake(stream, credential).await?;
            return Ok(StreamAuth::Passthrough);
        }

        if scheme != BEARER_TOKEN_PREFIX {
            return Err(AuthError::UnsupportedScheme(scheme.to_string()).into());
        }

        let identity = self.validator.is_valid(credential).await?;
        Ok(StreamAuth::Authenticated(attach_identity(
            stream.context(),
            identity,
        )))
    }
}

/// Token from an `authorization: Bearer <token>` header, empty otherwise
fn bearer_token_from_metadata(metadata: &MetadataMap) -> &str {
    metadata
        .get(AUTHORIZATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_TOKEN_PREFIX))
        .and_then(|rest| rest.strip_prefix(' '))
        .unwrap_or("")
}

/// Decode `base64(username:password)`, splitting on the first colon
fn decode_basic_credentials(encoded: &str) -> Result<(String, String), AuthError> {
    let decoded = BASIC_CREDENTIALS_ENGINE.decode(encoded)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedCredentials)?;
    Ok((username.to_string(), password.to_string()))
}

/// Split `<scheme> <credential>`; a value without a space is all scheme
fn split_authorization(value: &str) -> (&str, &str) {
    value.split_once(' ').unwrap_or((value, ""))
}

#[async_trait]
impl CallInterceptor for BearerTokenInterceptor {
    async fn intercept_unary(
        &self,
        ctx: CallContext,
        info: &CallInfo,
    ) -> Result<CallContext, Status> {
        let token = bearer_token_from_metadata(ctx.metadata()).to_string();
        let identity = match self.validator.is_valid(&token).await {
            Ok(identity) => identity,
            Err(status) => {
                tracing::warn!(method = %info.full_method(), scheme = SCHEME, reason = %status.message(), "gRPC call rejected");
                record_auth_attempt(SCHEME, "unary", "rejected");
                return Err(status);
            }
        };

        tracing::debug!(method = %info.full_method(), scheme = SCHEME, "gRPC call authenticated");
        record_auth_attempt(SCHEME, "unary", "success");
        Ok(attach_identity(&ctx, identity))
    }

    async fn intercept_stream(
        &self,
        stream: &mut dyn StreamMetadata,
        info: &CallInfo,
    ) -> Result<StreamAuth, Status> {
        let kind = if info.is_handshake(&self.handshake_suffix) {
            "handshake"
        } else {
            "stream"
        };
        let outcome = self.authorize_stream(stream, info).await;
        match &outcome {
            Ok(StreamAuth::Passthrough) => {
                tracing::debug!(method = %info.full_method(), scheme = SCHEME, "Bearer token issued");
                record_auth_attempt(SCHEME, "handshake", "success");
            }
            Ok(StreamAuth::Authenticated(_)) => {
                tracing::debug!(method = %info.full_method(), scheme = SCHEME, "gRPC stream authenticated");
                record_auth_attempt(SCHEME, "stream", "success");
            }
            Err(status) => {
                tracing::warn!(method = %info.full_method(), scheme = SCHEME, reason = %status.message(), "gRPC stream rejected");
                record_auth_attempt(SCHEME, kind, "rejected");
            }
        }
        outcome
    }

    fn name(&self) -> &'static str {
        SCHEME
    }
}
