//! Peer identity attached to a call's context
//!
//! Whatever a validator or handshake authenticator returns for a token is
//! carried as a [`PeerIdentity`] and stored under a key type private to this
//! module, so it can only be bound by the authentication interceptors.

use crate::context::CallContext;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque identity produced by a successful token validation
#[derive(Clone)]
pub struct PeerIdentity(Arc<dyn Any + Send + Sync>);

impl PeerIdentity {
    /// Wrap any caller-defined identity value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the identity as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether the identity holds a value of type `T`
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PeerIdentity(..)")
    }
}

struct AuthCtxKey;

/// Derive a context carrying `identity`
pub fn attach_identity(ctx: &CallContext, identity: PeerIdentity) -> CallContext {
    ctx.with_value::<AuthCtxKey, _>(identity)
}

/// Return whatever identity the active authenticator produced for this call
///
/// `None` when no authentication happened on the path that built `ctx`.
pub fn auth_from_context(ctx: &CallContext) -> Option<&PeerIdentity> {
    ctx.value::<AuthCtxKey, PeerIdentity>()
}
