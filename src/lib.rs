//! Flight Auth - pluggable authentication for Flight style gRPC services
//!
//! This crate provides handshake-token and Basic/Bearer authentication that
//! runs ahead of every call, and carries the authenticated peer identity to
//! service handlers through the call context.

pub mod config;
pub mod context;
pub mod error;
pub mod grpc;
pub mod identity;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AuthConfig, AuthMode};
pub use context::CallContext;
pub use error::{AuthError, Result};
pub use grpc::ServerAuth;
pub use identity::{attach_identity, auth_from_context, PeerIdentity};
