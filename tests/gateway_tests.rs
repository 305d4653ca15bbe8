//! Integration tests for the forwarding gateway
//!
//! A wiremock server stands in for the upstream provider; requests are
//! driven through the real router with tower's oneshot.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_gateway::auth::AccessCodeAuthorizer;
use llm_gateway::config::{
    AllowlistConfig, AppConfig, AuthConfig, ProviderConfig, ServerConfig, UpstreamConfig,
};
use llm_gateway::gateway::{build_http_client, build_router, GatewayState};

fn test_config(upstream_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        provider: ProviderConfig::default(),
        upstream: UpstreamConfig {
            url: upstream_url.to_string(),
            timeout_seconds: 600,
        },
        auth: AuthConfig::default(),
        allowlist: AllowlistConfig::default(),
    }
}

fn test_router(config: AppConfig) -> Router {
    let authorizer = Arc::new(AccessCodeAuthorizer::new(config.auth.clone()));
    build_router(GatewayState {
        config: Arc::new(config),
        http_client: build_http_client().expect("client"),
        authorizer,
    })
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

async fn body_json_value(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("response body is JSON")
}

#[tokio::test]
async fn options_short_circuits_before_auth() {
    let upstream = MockServer::start().await;

    // Access codes are configured, so anything reaching the authorizer
    // without one would be rejected
    let mut config = test_config(&upstream.uri());
    config.auth.access_codes = vec!["secret".to_string()];
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/alibaba/v1/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json_value(response).await;
    assert_eq!(json["body"], "OK");

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn preflight_shaped_options_gets_literal_ok_body() {
    let upstream = MockServer::start().await;
    let app = test_router(test_config(&upstream.uri()));

    // Browser preflight headers must not change the response: the handler
    // owns OPTIONS, no middleware answers it first
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/alibaba/v1/chat")
                .header("Origin", "http://localhost:3000")
                .header("Access-Control-Request-Method", "POST")
                .header("Access-Control-Request-Headers", "authorization")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json_value(response).await;
    assert_eq!(json["body"], "OK");

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn auth_rejection_returns_401_without_upstream_call() {
    let upstream = MockServer::start().await;

    let mut config = test_config(&upstream.uri());
    config.auth.access_codes = vec!["secret".to_string()];
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"qwen-max"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json_value(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["msg"], "empty access code");

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn model_gate_rejects_with_403_and_no_upstream_call() {
    let upstream = MockServer::start().await;

    let mut config = test_config(&upstream.uri());
    config.allowlist.custom_models = "-qwen-max".to_string();
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"qwen-max"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json_value(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(
        json["message"],
        "you are not allowed to use qwen-max model"
    );

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn model_gate_fails_open_on_unparseable_body() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_string("this is not json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = test_config(&upstream.uri());
    config.allowlist.custom_models = "-all".to_string();
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from("this is not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    // The gate cannot evaluate the body, so the request goes through unchanged
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn model_gate_allows_permitted_model() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_json(serde_json::json!({"model": "qwen-max"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = test_config(&upstream.uri());
    config.allowlist.custom_models = "-all,+qwen-max".to_string();
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"qwen-max"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn end_to_end_passthrough_with_sanitized_headers() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-DashScope-SSE", "disable"))
        .and(body_json(serde_json::json!({"model": "x"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("WWW-Authenticate", "Basic realm=\"upstream\"")
                .insert_header("X-Request-Id", "abc123")
                .set_body_string(r#"{"output":"hello"}"#),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = test_config(&upstream.uri());
    config.allowlist.custom_models = "-blocked".to_string();
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("www-authenticate").is_none());
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
    assert_eq!(response.headers().get("x-request-id").unwrap(), "abc123");
    assert_eq!(body_bytes(response).await, br#"{"output":"hello"}"#);
}

#[tokio::test]
async fn authorization_and_stream_headers_pass_through_verbatim() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header("Authorization", "Bearer sk-user-key"))
        .and(header("X-DashScope-SSE", "enable"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = test_router(test_config(&upstream.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .header("Authorization", "Bearer sk-user-key")
                .header("X-DashScope-SSE", "enable")
                .body(Body::from(r#"{"model":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_status_passes_through_with_challenge_stripped() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("WWW-Authenticate", "Bearer")
                .set_body_string(r#"{"message":"invalid api key"}"#),
        )
        .mount(&upstream)
        .await;

    let app = test_router(test_config(&upstream.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("www-authenticate").is_none());
    assert_eq!(body_bytes(response).await, br#"{"message":"invalid api key"}"#);
}

#[tokio::test]
async fn upstream_transport_failure_yields_json_error_body() {
    // Nothing listens here; the connection is refused
    let app = test_router(test_config("http://127.0.0.1:9"));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    // Status stays at the framework default; the body carries the error
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json_value(response).await;
    assert_eq!(json["error"], true);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("upstream request failed"));
}

#[tokio::test]
async fn slow_upstream_hits_timeout_and_returns_error() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&upstream)
        .await;

    let mut config = test_config(&upstream.uri());
    config.upstream.timeout_seconds = 1;
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/alibaba/v1/chat")
                .body(Body::from(r#"{"model":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json_value(response).await;
    assert_eq!(json["error"], true);
    assert!(json["message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn get_without_body_forwards_with_default_headers() {
    let upstream = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("X-DashScope-SSE", "disable"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models":[]}"#))
        .expect(1)
        .mount(&upstream)
        .await;

    // Gate active to exercise the empty-body materialization path
    let mut config = test_config(&upstream.uri());
    config.allowlist.custom_models = "-all".to_string();
    let app = test_router(config);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/alibaba/v1/models")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, br#"{"models":[]}"#);
}
