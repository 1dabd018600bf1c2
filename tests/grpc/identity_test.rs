//! Identity propagation through contexts and wrapped streams

use super::*;
use flight_auth::grpc::stream::AuthWrappedStream;
use flight_auth::{attach_identity, auth_from_context};

struct TenantKey;

#[test]
fn test_identity_recoverable_from_derived_contexts() {
    let root = CallContext::new(authorization("Bearer T"));
    let authed = attach_identity(&root, PeerIdentity::new("alice".to_string()));
    let derived = authed.with_value::<TenantKey, _>("tenant-a");

    assert_eq!(identity_name(&authed).as_deref(), Some("alice"));
    assert_eq!(identity_name(&derived).as_deref(), Some("alice"));
    assert_eq!(derived.value::<TenantKey, &str>(), Some(&"tenant-a"));
    assert_eq!(derived.metadata().get("authorization").unwrap(), "Bearer T");
}

#[test]
fn test_identity_absent_on_unrelated_contexts() {
    let root = CallContext::new(MetadataMap::new());
    let _authed = attach_identity(&root, PeerIdentity::new("alice".to_string()));

    assert!(auth_from_context(&root).is_none());
    assert!(auth_from_context(&CallContext::default()).is_none());
}

#[test]
fn test_reattaching_shadows_earlier_identity() {
    let first = attach_identity(&CallContext::default(), PeerIdentity::new("alice".to_string()));
    let second = attach_identity(&first, PeerIdentity::new("bob".to_string()));

    assert_eq!(identity_name(&first).as_deref(), Some("alice"));
    assert_eq!(identity_name(&second).as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_wrapper_leaves_original_stream_untouched() {
    let stream = InMemoryStream::new(authorization("Bearer T")).with_inbound(&["a"]);
    let sent = stream.sent();
    let trailer = stream.trailer();
    let ctx = attach_identity(stream.context(), PeerIdentity::new("alice".to_string()));

    let mut wrapped = AuthWrappedStream::new(stream, ctx);
    assert_eq!(identity_name(wrapped.context()).as_deref(), Some("alice"));
    assert!(identity_name(wrapped.get_ref().context()).is_none());

    assert_eq!(wrapped.recv_message().await.unwrap(), Some("a".to_string()));
    wrapped.send_message("b".to_string()).await.unwrap();
    wrapped.set_trailer(authorization("Bearer U"));

    let original = wrapped.into_inner();
    assert!(identity_name(original.context()).is_none());
    assert_eq!(*sent.lock().unwrap(), vec!["b".to_string()]);
    assert_eq!(trailer.lock().unwrap().get("authorization").unwrap(), "Bearer U");
}
