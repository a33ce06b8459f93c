//! Integration tests for the unified client against a mock upstream

use std::time::{Duration, Instant};

use futures::future::join_all;
use relaygate_common::{ErrorCategory, ErrorContext};
use relaygate_infra::{ClientConfig, ClientErrorKind, OperationKind, UnifiedClient};
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> UnifiedClient {
    client_with(server, |config| config)
}

fn client_with(
    server: &MockServer,
    tweak: impl FnOnce(ClientConfig) -> ClientConfig,
) -> UnifiedClient {
    let config = ClientConfig::new("ghp_integration")
        .with_base_url(server.uri())
        .with_retry_delays_ms(vec![10, 20]);
    UnifiedClient::new(tweak(config)).expect("client")
}

#[tokio::test]
async fn test_endpoint_call_sends_token_and_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "is:open"))
        .and(header("authorization", "Bearer ghp_integration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total_count": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response =
        client.call_endpoint(Method::GET, "/search/issues", Some(json!({ "q": "is:open" }))).await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.data, Some(json!({ "total_count": 2 })));
    assert_eq!(response.metadata.operation_kind, OperationKind::Endpoint);
    assert_eq!(response.metadata.retry_count, 0);
}

#[tokio::test]
async fn test_pool_caps_concurrent_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({ "ok": true })),
        )
        .expect(5)
        .mount(&server)
        .await;

    let client = client_with(&server, |config| config.with_max_connections(2));
    let started = Instant::now();

    let calls = join_all((0..5).map(|i| {
        let path = format!("/items/{i}");
        let client = &client;
        async move { client.call_endpoint(Method::GET, &path, None).await }
    }));
    let snapshot = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.get_connection_pool_status()
    };
    let (responses, during) = tokio::join!(calls, snapshot);

    assert!(responses.iter().all(|r| r.success));
    assert_eq!(during.active, 2);
    assert_eq!(during.queued, 3);
    // Three waves of two, two and one call
    assert!(started.elapsed() >= Duration::from_millis(900));

    let after = client.get_connection_pool_status();
    assert_eq!((after.active, after.idle, after.queued), (0, 2, 0));
}

#[tokio::test]
async fn test_rate_limited_call_waits_for_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let started = Instant::now();
    let response = client.call_endpoint(Method::GET, "/repos/a/b", None).await;

    assert!(response.success);
    assert_eq!(response.metadata.retry_count, 1);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(2));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = client.call_endpoint(Method::GET, "/items/7", None).await.into_result();

    assert_eq!(data.unwrap(), json!({ "id": 7 }));
}

#[tokio::test]
async fn test_auth_failure_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client.call_endpoint(Method::GET, "/user", None).await.into_result().unwrap_err();

    assert_eq!(error.kind, ClientErrorKind::Auth);
    assert_eq!(error.status, Some(401));
    assert!(!error.retryable);
}

#[tokio::test]
async fn test_gone_endpoint_is_deprecated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(410)
                .set_body_json(json!({ "message": "This API is deprecated" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client.call_endpoint(Method::GET, "/legacy", None).await.into_result().unwrap_err();

    assert_eq!(error.kind, ClientErrorKind::ApiDeprecated);
    assert_eq!(error.endpoint, "/legacy");
}

#[tokio::test]
async fn test_structured_query_returns_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "owner": "octo" } })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "5000")
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_json(json!({ "data": { "repositoryOwner": { "login": "octo" } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .call_structured_query(
            "query($owner: String!) { repositoryOwner(login: $owner) { login } }",
            Some(json!({ "owner": "octo" })),
        )
        .await;

    assert_eq!(response.metadata.operation_kind, OperationKind::StructuredQuery);
    assert_eq!(response.data, Some(json!({ "repositoryOwner": { "login": "octo" } })));
    assert_eq!(client.cached_rate_limit_info().map(|info| info.remaining), Some(4999));
}

#[tokio::test]
async fn test_structured_query_errors_fail_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a User" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error =
        client.call_structured_query("{ user(login: \"x\") { id } }", None).await.into_result();

    let error = error.unwrap_err();
    assert_eq!(error.kind, ClientErrorKind::UnknownError);
    assert!(error.message.contains("Could not resolve to a User"));
}

#[tokio::test]
async fn test_rate_limit_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": {
                "core": { "limit": 5000, "remaining": 12, "reset": 1700000600, "used": 4988 }
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let info = client.get_rate_limit_info().await.expect("rate limit info");

    assert_eq!(info.remaining, 12);
    assert_eq!(info.used, 4988);
    assert_eq!(client.cached_rate_limit_info(), Some(info));
}

#[tokio::test]
async fn test_orchestrator_drives_client_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/issues"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with(&server, |config| config.with_retry_attempts(0));
    let result = client
        .execute_with_retry(
            || async {
                client
                    .call_endpoint(Method::POST, "/issues", Some(json!({ "title": "" })))
                    .await
                    .into_result()
            },
            Some(ErrorContext::new("create_issue")),
        )
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.category(), ErrorCategory::Validation);
    assert!(!error.retry_decision.should_retry);
}
