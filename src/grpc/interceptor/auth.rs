//! Installed authentication scheme and its tonic entry points

use super::{
    authorize_stream, intercept_unary, BasicAuthValidator, BearerTokenInterceptor, CallInfo,
    CallInterceptor, HandshakeAuthInterceptor, StreamAuth, FLIGHT_HANDSHAKE_METHOD,
};
use crate::config::{AuthConfig, AuthMode};
use crate::context::CallContext;
use crate::error::{AuthError, Result};
use crate::grpc::handshake::{handshake_handler, ServerAuthHandler};
use crate::grpc::proto::{HandshakeRequest, HandshakeResponse};
use crate::grpc::stream::{BoxServerStream, ResponseStream, StreamMetadata, TonicServerStream};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

/// Scheme occupying the interceptor slot
///
/// An enum rather than `dyn CallInterceptor` so the installed scheme can be
/// inspected, e.g. to find the handshake authenticator.
#[derive(Clone)]
pub enum AuthenticatorMode {
    /// Handshake tokens, or open access when the interceptor is disabled
    Handshake(HandshakeAuthInterceptor),
    /// Basic credentials exchanged for bearer tokens
    BearerToken(BearerTokenInterceptor),
}

#[async_trait]
impl CallInterceptor for AuthenticatorMode {
    async fn intercept_unary(
        &self,
        ctx: CallContext,
        info: &CallInfo,
    ) -> std::result::Result<CallContext, Status> {
        match self {
            AuthenticatorMode::Handshake(auth) => auth.intercept_unary(ctx, info).await,
            AuthenticatorMode::BearerToken(auth) => auth.intercept_unary(ctx, info).await,
        }
    }

    async fn intercept_stream(
        &self,
        stream: &mut dyn StreamMetadata,
        info: &CallInfo,
    ) -> std::result::Result<StreamAuth, Status> {
        match self {
            AuthenticatorMode::Handshake(auth) => auth.intercept_stream(stream, info).await,
            AuthenticatorMode::BearerToken(auth) => auth.intercept_stream(stream, info).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AuthenticatorMode::Handshake(auth) => auth.name(),
            AuthenticatorMode::BearerToken(auth) => auth.name(),
        }
    }
}

/// Server-side authentication for a Flight style gRPC service
///
/// Wraps service method bodies: `serve_unary` and `serve_streaming` run the
/// installed interceptor before the handler, `serve_handshake` is the body of
/// the handshake method itself.
#[derive(Clone)]
pub struct ServerAuth {
    mode: AuthenticatorMode,
}

impl ServerAuth {
    pub fn new(mode: AuthenticatorMode) -> Self {
        Self { mode }
    }

    /// Open access: no call is authenticated
    ///
    /// See [`HandshakeAuthInterceptor::disabled`].
    pub fn disabled() -> Self {
        Self::new(AuthenticatorMode::Handshake(
            HandshakeAuthInterceptor::disabled(),
        ))
    }

    /// Handshake authentication driven by `authenticator`
    pub fn handshake(authenticator: Arc<dyn ServerAuthHandler>) -> Self {
        Self::new(AuthenticatorMode::Handshake(HandshakeAuthInterceptor::new(
            authenticator,
        )))
    }

    /// Basic/Bearer authentication checked by `validator`
    pub fn bearer_token(validator: Arc<dyn BasicAuthValidator>) -> Self {
        Self::new(AuthenticatorMode::BearerToken(BearerTokenInterceptor::new(
            validator,
        )))
    }

    /// Resolve the configured scheme
    ///
    /// Fails when the scheme's collaborator is missing, and refuses open
    /// access unless the configuration allows unauthenticated calls.
    pub fn from_config(
        config: &AuthConfig,
        authenticator: Option<Arc<dyn ServerAuthHandler>>,
        validator: Option<Arc<dyn BasicAuthValidator>>,
    ) -> Result<Self> {
        let suffix = config.handshake_method_suffix.clone();
        let mode = match (config.mode, authenticator, validator) {
            (AuthMode::BasicBearer, _, Some(validator)) => {
                info!("gRPC authentication enabled: basic/bearer mode");
                AuthenticatorMode::BearerToken(
                    BearerTokenInterceptor::new(validator).with_handshake_suffix(suffix),
                )
            }
            (AuthMode::BasicBearer, _, None) => {
                return Err(AuthError::Config(
                    "basic_bearer mode requires a validator".to_string(),
                ));
            }
            (AuthMode::Handshake, Some(authenticator), _) => {
                info!("gRPC authentication enabled: handshake mode");
                AuthenticatorMode::Handshake(
                    HandshakeAuthInterceptor::new(authenticator).with_handshake_suffix(suffix),
                )
            }
            (AuthMode::Handshake, None, _) | (AuthMode::None, _, _) => {
                if !config.allow_unauthenticated {
                    return Err(AuthError::Config(format!(
                        "auth mode '{}' has no authenticator and unauthenticated access is not allowed",
                        config.mode
                    )));
                }
                warn!("gRPC authentication disabled: every call is accepted without credentials");
                AuthenticatorMode::Handshake(
                    HandshakeAuthInterceptor::disabled().with_handshake_suffix(suffix),
                )
            }
        };

        Ok(Self::new(mode))
    }

    /// Method suffix the installed scheme treats as the handshake
    pub fn handshake_suffix(&self) -> &str {
        match &self.mode {
            AuthenticatorMode::Handshake(auth) => auth.handshake_suffix(),
            AuthenticatorMode::BearerToken(auth) => auth.handshake_suffix(),
        }
    }

    pub fn mode(&self) -> &AuthenticatorMode {
        &self.mode
    }

    /// Authenticator run by the handshake method, if any
    pub fn handshake_authenticator(&self) -> Option<Arc<dyn ServerAuthHandler>> {
        match &self.mode {
            AuthenticatorMode::Handshake(auth) => auth.authenticator().cloned(),
            AuthenticatorMode::BearerToken(_) => None,
        }
    }

    /// Authenticate a unary request, then run `handler` with the call's context
    pub async fn serve_unary<Req, Resp, H, Fut>(
        &self,
        request: Request<Req>,
        info: &CallInfo,
        handler: H,
    ) -> std::result::Result<Response<Resp>, Status>
    where
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = std::result::Result<Response<Resp>, Status>>,
    {
        let ctx = CallContext::from_request(&request);
        intercept_unary(&self.mode, ctx, request.into_inner(), info, handler).await
    }

    /// Authenticate a streaming request, then run `handler` on its own task
    ///
    /// Rejections are returned directly; once accepted, the handler's result
    /// terminates the returned response stream.
    pub async fn serve_streaming<Req, Resp, St, H, Fut>(
        &self,
        request: Request<St>,
        info: &CallInfo,
        handler: H,
    ) -> std::result::Result<Response<ResponseStream<Resp>>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        St: Stream<Item = std::result::Result<Req, Status>> + Send + 'static,
        H: FnOnce(BoxServerStream<Req, Resp>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), Status>> + Send + 'static,
    {
        let (stream, completion, responses) = TonicServerStream::from_request(request);
        let stream = authorize_stream(&self.mode, stream, info).await?;

        tokio::spawn(async move {
            let result = handler(stream).await;
            completion.finish(result).await;
        });

        Ok(Response::new(responses))
    }

    /// Body of the handshake method
    ///
    /// Runs the installed interceptor (which exempts or Basic-authenticates
    /// the handshake) and then the handshake authenticator, if any. The call
    /// is always named so that it matches the installed handshake suffix.
    pub async fn serve_handshake<St>(
        &self,
        request: Request<St>,
    ) -> std::result::Result<Response<ResponseStream<HandshakeResponse>>, Status>
    where
        St: Stream<Item = std::result::Result<HandshakeRequest, Status>> + Send + 'static,
    {
        let info = self.handshake_call_info(&request);
        let authenticator = self.handshake_authenticator();

        self.serve_streaming(request, &info, move |stream| async move {
            handshake_handler(authenticator.as_deref(), stream).await
        })
        .await
    }

    fn handshake_call_info<T>(&self, request: &Request<T>) -> CallInfo {
        let suffix = self.handshake_suffix();
        CallInfo::from_request(request)
            .filter(|info| info.is_handshake(suffix))
            .unwrap_or_else(|| {
                let flight = CallInfo::new(FLIGHT_HANDSHAKE_METHOD);
                if flight.is_handshake(suffix) {
                    flight
                } else {
                    CallInfo::new(suffix)
                }
            })
    }
}
