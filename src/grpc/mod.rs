//! gRPC authentication plumbing

pub mod handshake;
pub mod interceptor;
pub mod proto;
pub mod stream;

pub use handshake::{handshake_handler, AuthConn, ServerAuthConn, ServerAuthHandler};
pub use interceptor::{
    AuthenticatorMode, BasicAuthValidator, BearerTokenInterceptor, CallInfo, CallInterceptor,
    HandshakeAuthInterceptor, ServerAuth, StreamAuth,
};
pub use stream::{AuthWrappedStream, BoxServerStream, ServerStream, StreamMetadata};
