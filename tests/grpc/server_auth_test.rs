//! End-to-end tests through the tonic entry points of `ServerAuth`

use super::*;
use flight_auth::grpc::interceptor::{CallInfo, ServerAuth};
use flight_auth::grpc::proto::{HandshakeRequest, HandshakeResponse};
use flight_auth::{AuthConfig, AuthMode};
use tokio_stream::StreamExt;
use tonic::{Code, GrpcMethod, Request, Response};

const SERVICE: &str = "arrow.flight.protocol.FlightService";

fn handshake_request(
    payloads: &[&'static [u8]],
) -> Request<impl tokio_stream::Stream<Item = Result<HandshakeRequest, Status>> + Send + 'static>
{
    let messages: Vec<_> = payloads
        .iter()
        .map(|payload| {
            Ok::<_, Status>(HandshakeRequest {
                protocol_version: 1,
                payload: Bytes::from_static(*payload),
            })
        })
        .collect();
    let mut request = Request::new(tokio_stream::iter(messages));
    request
        .extensions_mut()
        .insert(GrpcMethod::new(SERVICE, "Handshake"));
    request
}

fn call_request(
    metadata: MetadataMap,
    messages: Vec<&'static str>,
) -> Request<impl tokio_stream::Stream<Item = Result<String, Status>> + Send + 'static> {
    let messages = messages.into_iter().map(|m| Ok::<_, Status>(m.to_string()));
    let mut request = Request::new(tokio_stream::iter(messages));
    *request.metadata_mut() = metadata;
    request
}

fn do_get() -> CallInfo {
    CallInfo::new(format!("/{}/DoGet", SERVICE))
}

/// Echo the caller's identity, then every inbound message
async fn echo_identity(
    mut stream: flight_auth::grpc::BoxServerStream<String, String>,
) -> Result<(), Status> {
    let name = identity_name(stream.context()).unwrap_or_else(|| "anonymous".to_string());
    stream.send_message(name).await?;
    while let Some(message) = stream.recv_message().await? {
        stream.send_message(message).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_handshake_then_token_call() {
    let authenticator = Arc::new(ChallengeAuthenticator::default());
    let auth = ServerAuth::handshake(authenticator.clone());

    let response = auth
        .serve_handshake(handshake_request(&[b"alice", ANSWER]))
        .await
        .unwrap();
    let replies: Vec<HandshakeResponse> = response
        .into_inner()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(authenticator.authenticate_calls(), 1);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].payload.as_ref(), CHALLENGE);
    assert_eq!(replies[1].payload.as_ref(), ISSUED_TOKEN);
    assert!(replies.iter().all(|reply| reply.protocol_version == 0));

    let mut request = Request::new("flight-descriptor");
    *request.metadata_mut() = auth_token(ISSUED_TOKEN);
    let response = auth
        .serve_unary(
            request,
            &CallInfo::new(format!("/{}/GetFlightInfo", SERVICE)),
            |ctx, req| async move {
                assert_eq!(req, "flight-descriptor");
                Ok::<_, Status>(Response::new(identity_name(&ctx)))
            },
        )
        .await
        .unwrap();
    assert_eq!(response.into_inner().as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_handshake_failure_terminates_stream() {
    let auth = ServerAuth::handshake(Arc::new(ChallengeAuthenticator::default()));

    let mut responses = auth
        .serve_handshake(handshake_request(&[b"alice", b"guess"]))
        .await
        .unwrap()
        .into_inner();

    let challenge = responses.next().await.unwrap().unwrap();
    assert_eq!(challenge.payload.as_ref(), CHALLENGE);
    let status = responses.next().await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "wrong answer");
    assert!(responses.next().await.is_none());
}

#[tokio::test]
async fn test_handshake_closed_early_is_aborted() {
    let auth = ServerAuth::handshake(Arc::new(ChallengeAuthenticator::default()));

    let mut responses = auth
        .serve_handshake(handshake_request(&[b"alice"]))
        .await
        .unwrap()
        .into_inner();

    let challenge = responses.next().await.unwrap().unwrap();
    assert_eq!(challenge.payload.as_ref(), CHALLENGE);
    let status = responses.next().await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Aborted);
}

#[tokio::test]
async fn test_streaming_call_sees_identity() {
    let auth = ServerAuth::handshake(Arc::new(ChallengeAuthenticator::default()));

    let response = auth
        .serve_streaming(
            call_request(auth_token(ISSUED_TOKEN), vec!["one", "two"]),
            &do_get(),
            echo_identity,
        )
        .await
        .unwrap();
    let replies: Vec<String> = response
        .into_inner()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(replies, vec!["alice", "one", "two"]);
}

#[tokio::test]
async fn test_streaming_rejection_is_immediate() {
    let auth = ServerAuth::handshake(Arc::new(ChallengeAuthenticator::default()));

    let status = expect_rejected(
        auth.serve_streaming(
            call_request(auth_token(b"forged"), vec![]),
            &do_get(),
            echo_identity,
        )
        .await,
    );
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn test_basic_bearer_round_trip() {
    let validator = Arc::new(TokenStoreValidator::new("T").with_user("alice", "secret"));
    let auth = ServerAuth::bearer_token(validator.clone());

    let mut request = handshake_request(&[]);
    request
        .metadata_mut()
        .insert("authorization", "Basic YWxpY2U6c2VjcmV0".parse().unwrap());
    let mut responses = auth.serve_handshake(request).await.unwrap().into_inner();

    // The trailer rides on the terminal status
    let status = responses.next().await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Ok);
    assert_eq!(status.metadata().get("authorization").unwrap(), "Bearer T");
    assert!(responses.next().await.is_none());

    let response = auth
        .serve_streaming(
            call_request(authorization("Bearer T"), vec!["ping"]),
            &do_get(),
            echo_identity,
        )
        .await
        .unwrap();
    let replies: Vec<String> = response
        .into_inner()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(replies, vec!["alice", "ping"]);
}

#[tokio::test]
async fn test_basic_bearer_handshake_rejected_before_handler() {
    let validator = Arc::new(TokenStoreValidator::new("T").with_user("alice", "secret"));
    let auth = ServerAuth::bearer_token(validator.clone());

    let status = expect_rejected(auth.serve_handshake(handshake_request(&[])).await);
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "must authenticate first");
    assert_eq!(validator.validate_calls(), 0);
}

#[tokio::test]
async fn test_disabled_accepts_everything() {
    let auth = ServerAuth::disabled();

    let mut responses = auth
        .serve_handshake(handshake_request(&[b"ignored"]))
        .await
        .unwrap()
        .into_inner();
    assert!(responses.next().await.is_none());

    let response = auth
        .serve_streaming(
            call_request(MetadataMap::new(), vec!["x"]),
            &do_get(),
            echo_identity,
        )
        .await
        .unwrap();
    let replies: Vec<String> = response
        .into_inner()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(replies, vec!["anonymous", "x"]);

    let response = auth
        .serve_unary(Request::new(()), &do_get(), |ctx, _| async move {
            Ok::<_, Status>(Response::new(identity_name(&ctx)))
        })
        .await
        .unwrap();
    assert!(response.into_inner().is_none());
}

#[tokio::test]
async fn test_from_config_installs_configured_scheme() {
    let config = AuthConfig {
        mode: AuthMode::BasicBearer,
        ..AuthConfig::default()
    };
    let validator: Arc<dyn BasicAuthValidator> =
        Arc::new(TokenStoreValidator::new("T").with_issued("T", "alice"));
    let auth = ServerAuth::from_config(&config, None, Some(validator)).unwrap();

    let response = auth
        .serve_unary(
            Request::from_parts(authorization("Bearer T"), Default::default(), ()),
            &do_get(),
            |ctx, _| async move { Ok::<_, Status>(Response::new(identity_name(&ctx))) },
        )
        .await
        .unwrap();
    assert_eq!(response.into_inner().as_deref(), Some("alice"));
}

#[test]
fn test_from_config_rejects_missing_validator() {
    let config = AuthConfig {
        mode: AuthMode::BasicBearer,
        ..AuthConfig::default()
    };
    let authenticator: Arc<dyn ServerAuthHandler> = Arc::new(ChallengeAuthenticator::default());
    let result = ServerAuth::from_config(&config, Some(authenticator), None);
    assert!(matches!(result, Err(flight_auth::AuthError::Config(_))));
}

fn login_config(mode: AuthMode) -> AuthConfig {
    AuthConfig::from_lookup(|key| match key {
        "FLIGHT_AUTH_MODE" => Some(mode.as_str().to_string()),
        "FLIGHT_AUTH_HANDSHAKE_SUFFIX" => Some("/Login".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_custom_suffix_handshake_runs_authenticator() {
    let authenticator = Arc::new(ChallengeAuthenticator::default());
    let handler: Arc<dyn ServerAuthHandler> = authenticator.clone();
    let auth = ServerAuth::from_config(&login_config(AuthMode::Handshake), Some(handler), None)
        .unwrap();

    let response = auth
        .serve_handshake(Request::new(tokio_stream::iter(vec![
            Ok::<_, Status>(HandshakeRequest {
                protocol_version: 0,
                payload: Bytes::from_static(b"alice"),
            }),
            Ok(HandshakeRequest {
                protocol_version: 0,
                payload: Bytes::from_static(ANSWER),
            }),
        ])))
        .await
        .unwrap();
    let replies: Vec<HandshakeResponse> = response
        .into_inner()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(authenticator.authenticate_calls(), 1);
    assert_eq!(replies.last().unwrap().payload.as_ref(), ISSUED_TOKEN);
}

#[tokio::test]
async fn test_custom_suffix_basic_handshake_issues_trailer() {
    let validator: Arc<dyn BasicAuthValidator> =
        Arc::new(TokenStoreValidator::new("T").with_user("alice", "secret"));
    let auth =
        ServerAuth::from_config(&login_config(AuthMode::BasicBearer), None, Some(validator))
            .unwrap();

    let mut request = Request::new(tokio_stream::iter(Vec::<Result<HandshakeRequest, Status>>::new()));
    request
        .metadata_mut()
        .insert("authorization", "Basic YWxpY2U6c2VjcmV0".parse().unwrap());
    let mut responses = auth.serve_handshake(request).await.unwrap().into_inner();

    let status = responses.next().await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Ok);
    assert_eq!(status.metadata().get("authorization").unwrap(), "Bearer T");
}
