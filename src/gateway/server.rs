//! Gateway server: router construction and serving

use axum::{
    extract::State,
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handler::GatewayHandler;
use crate::auth::{AccessCodeAuthorizer, Authorizer};
use crate::config::AppConfig;

/// Shared state for the gateway
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Build the outbound HTTP client.
///
/// Redirects are never followed automatically; upstream redirects are passed
/// back to the caller as-is. No client-level timeout is set because the
/// per-request bound must stop covering the response body once headers
/// arrive, so streamed responses can outlive it.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Build the gateway router for the configured provider mount.
///
/// No CORS layer here: the handler answers OPTIONS itself with the literal
/// `{"body":"OK"}` body, and a layer would intercept OPTIONS before the
/// handler sees it.
pub fn build_router(state: GatewayState) -> Router {
    let mount = format!("/api/{}/*path", state.config.provider.name);

    Router::new()
        .route("/health", get(health_handler))
        .route(&mount, any(gateway_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the gateway server
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let http_client = build_http_client()?;
    let authorizer: Arc<dyn Authorizer> =
        Arc::new(AccessCodeAuthorizer::new(config.auth.clone()));

    let state = GatewayState {
        config: Arc::new(config.clone()),
        http_client,
        authorizer,
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("llm-gateway listening on {}", addr);
    tracing::info!(
        "Forwarding {} to {}",
        config.provider.mount_prefix(),
        config.upstream.base_url(&config.provider.default_url)
    );

    Ok(axum::serve(listener, app).await?)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Provider mount handler
async fn gateway_handler(
    State(state): State<GatewayState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let handler = GatewayHandler::new(state);
    handler.handle(req).await
}
