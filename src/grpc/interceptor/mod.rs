//! gRPC authentication interceptors
//!
//! Two interchangeable schemes share one interceptor slot:
//! - handshake tokens (`auth-token-bin`) validated by a [`ServerAuthHandler`]
//! - Basic credentials exchanged for a bearer token by a [`BasicAuthValidator`]
//!
//! Both implement [`CallInterceptor`], a pre-call hook that either derives
//! the context the handler sees or rejects the call.
//!
//! [`ServerAuthHandler`]: crate::grpc::handshake::ServerAuthHandler

pub mod auth;
pub mod bearer;
pub mod handshake_auth;

pub use auth::{AuthenticatorMode, ServerAuth};
pub use bearer::{BasicAuthValidator, BearerTokenInterceptor};
pub use handshake_auth::HandshakeAuthInterceptor;

use crate::context::CallContext;
use crate::grpc::stream::{AuthWrappedStream, BoxServerStream, ServerStream, StreamMetadata};
use async_trait::async_trait;
use std::future::Future;
use tonic::{GrpcMethod, Request, Status};

/// Binary metadata key carrying a handshake-issued token
pub const AUTH_TOKEN_HEADER: &str = "auth-token-bin";
/// Metadata key carrying Basic credentials or a bearer token
pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const BASIC_AUTH_PREFIX: &str = "Basic";
pub const BEARER_TOKEN_PREFIX: &str = "Bearer";
/// Calls whose full method name ends with this are handshake calls
pub const HANDSHAKE_METHOD_SUFFIX: &str = "/Handshake";
/// Full method name of the Flight handshake
pub const FLIGHT_HANDSHAKE_METHOD: &str = "/arrow.flight.protocol.FlightService/Handshake";

/// Call being intercepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    full_method: String,
}

impl CallInfo {
    /// `full_method` is the `/package.Service/Method` path of the call
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }

    /// Build from a `GrpcMethod` request extension, when one is present
    ///
    /// tonic's generated servers do not attach it, so servers usually build
    /// `CallInfo` from the method they implement.
    pub fn from_request<T>(request: &Request<T>) -> Option<Self> {
        request
            .extensions()
            .get::<GrpcMethod<'static>>()
            .map(|method| Self::new(format!("/{}/{}", method.service(), method.method())))
    }

    pub fn full_method(&self) -> &str {
        &self.full_method
    }

    /// Whether this call obtains tokens rather than presenting one
    pub fn is_handshake(&self, suffix: &str) -> bool {
        self.full_method.ends_with(suffix)
    }
}

/// Outcome of authenticating a streaming call
#[derive(Debug, Clone)]
pub enum StreamAuth {
    /// Hand the original stream to the handler untouched
    Passthrough,
    /// Hand the handler a stream exposing this context instead
    Authenticated(CallContext),
}

/// Pre-call authentication hook
#[async_trait]
pub trait CallInterceptor: Send + Sync {
    /// Authenticate a unary call, returning the context for its handler
    async fn intercept_unary(&self, ctx: CallContext, info: &CallInfo)
        -> Result<CallContext, Status>;

    /// Authenticate a streaming call
    ///
    /// The hook may set trailers on the stream but never replaces it.
    async fn intercept_stream(
        &self,
        stream: &mut dyn StreamMetadata,
        info: &CallInfo,
    ) -> Result<StreamAuth, Status>;

    /// Scheme name used in logs and metrics
    fn name(&self) -> &'static str;
}

/// Run `interceptor` for a unary call, then `handler` with the derived context
pub async fn intercept_unary<I, Req, Resp, H, Fut>(
    interceptor: &I,
    ctx: CallContext,
    request: Req,
    info: &CallInfo,
    handler: H,
) -> Result<Resp, Status>
where
    I: CallInterceptor + ?Sized,
    H: FnOnce(CallContext, Req) -> Fut,
    Fut: Future<Output = Result<Resp, Status>>,
{
    let ctx = interceptor.intercept_unary(ctx, info).await?;
    handler(ctx, request).await
}

/// Authenticate a streaming call and produce the stream its handler gets
pub async fn authorize_stream<I, S>(
    interceptor: &I,
    mut stream: S,
    info: &CallInfo,
) -> Result<BoxServerStream<S::Inbound, S::Outbound>, Status>
where
    I: CallInterceptor + ?Sized,
    S: ServerStream + 'static,
{
    let outcome = interceptor.intercept_stream(&mut stream, info).await?;
    let stream: BoxServerStream<S::Inbound, S::Outbound> = match outcome {
        StreamAuth::Passthrough => Box::new(stream),
        StreamAuth::Authenticated(ctx) => Box::new(AuthWrappedStream::new(stream, ctx)),
    };
    Ok(stream)
}

/// Run `interceptor` for a streaming call, then `handler` with the resulting stream
pub async fn intercept_stream<I, S, H, Fut>(
    interceptor: &I,
    stream: S,
    info: &CallInfo,
    handler: H,
) -> Result<(), Status>
where
    I: CallInterceptor + ?Sized,
    S: ServerStream + 'static,
    H: FnOnce(BoxServerStream<S::Inbound, S::Outbound>) -> Fut,
    Fut: Future<Output = Result<(), Status>>,
{
    let stream = authorize_stream(interceptor, stream, info).await?;
    handler(stream).await
}
