//! Request/response handler for the forwarding gateway
//!
//! Control flow per request is strictly linear: preflight short-circuit,
//! authorization, optional model gate, one bounded outbound call, response
//! sanitization. Every terminal state produces exactly one response; no
//! failure escapes to the enclosing server.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::time::Duration;

use super::server::GatewayState;
use crate::models::is_model_blocked;

/// Inbound bodies larger than this are rejected when the model gate has to
/// materialize them
const MAX_INSPECTED_BODY_BYTES: usize = 1024 * 1024 * 100;

/// Header set on every response to keep intermediaries (nginx) from
/// buffering streamed bodies
const ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream call timed out after {0}s")]
    Timeout(u64),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("invalid header in configuration: {0}")]
    InvalidHeader(String),

    #[error("failed to assemble response: {0}")]
    Response(String),
}

/// Best-effort JSON rendering of an error for the top-level catch
pub fn pretty_error(err: &GatewayError) -> serde_json::Value {
    serde_json::json!({
        "error": true,
        "message": err.to_string(),
    })
}

/// Only the `model` field matters to the gate; the rest of the body is opaque
#[derive(Debug, Deserialize)]
struct ModelProbe {
    model: Option<String>,
}

/// Strip the mount prefix from the ingress path wherever it occurs
fn rewrite_path(ingress_path: &str, mount_prefix: &str) -> String {
    ingress_path.replace(mount_prefix, "")
}

/// Copy upstream headers, dropping the credential challenge and overriding
/// the buffering header.
///
/// `WWW-Authenticate` is removed so a passed-through 401/407 cannot make the
/// calling browser pop a native credential prompt. Framing headers are
/// dropped because the body is re-framed as a fresh stream.
fn sanitize_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    headers.remove(header::WWW_AUTHENTICATE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(ACCEL_BUFFERING, HeaderValue::from_static("no"));
    headers
}

/// Per-request forwarding handler
pub struct GatewayHandler {
    state: GatewayState,
}

impl GatewayHandler {
    pub fn new(state: GatewayState) -> Self {
        Self { state }
    }

    /// Handle one inbound request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        // CORS preflight never reaches the authorizer
        if req.method() == Method::OPTIONS {
            return (StatusCode::OK, Json(serde_json::json!({ "body": "OK" }))).into_response();
        }

        let provider = self.state.config.provider.name.clone();

        if let Err(failure) = self
            .state
            .authorizer
            .authorize(req.headers(), &provider)
            .await
        {
            tracing::warn!(provider = %provider, msg = %failure.msg, "request rejected by authorizer");
            return (StatusCode::UNAUTHORIZED, Json(failure)).into_response();
        }

        match self.forward(req).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "forwarding failed");
                // Status stays at the framework default; the body carries the error
                Json(pretty_error(&e)).into_response()
            }
        }
    }

    /// Resolve the upstream target, apply the model gate, and stream the
    /// call through
    async fn forward(&self, req: Request<Body>) -> Result<Response, GatewayError> {
        let config = &self.state.config;

        let method = req.method().clone();
        let inbound_headers = req.headers().clone();
        let ingress_path = req.uri().path().to_string();

        let path = rewrite_path(&ingress_path, &config.provider.mount_prefix());
        let base_url = config.upstream.base_url(&config.provider.default_url);
        let fetch_url = format!("{}/{}", base_url, path);

        tracing::debug!(path = %path, base_url = %base_url, fetch_url = %fetch_url, "resolved upstream target");

        // The gate has to materialize the body: a byte stream can only be
        // read once, so the inspected text becomes the outbound body.
        let body = req.into_body();
        let outbound_body: reqwest::Body = if config.allowlist.is_active() {
            let bytes = to_bytes(body, MAX_INSPECTED_BODY_BYTES)
                .await
                .map_err(|e| GatewayError::BodyRead(e.to_string()))?;

            if !bytes.is_empty() {
                match serde_json::from_slice::<ModelProbe>(&bytes) {
                    Ok(probe) => {
                        if is_model_blocked(
                            &config.allowlist.custom_models,
                            probe.model.as_deref(),
                            &config.provider.name,
                        ) {
                            let model = probe.model.unwrap_or_default();
                            tracing::info!(model = %model, "model gate rejected request");
                            return Ok((
                                StatusCode::FORBIDDEN,
                                Json(serde_json::json!({
                                    "error": true,
                                    "message": format!("you are not allowed to use {} model", model),
                                })),
                            )
                                .into_response());
                        }
                    }
                    Err(e) => {
                        // Fail open: a body the gate cannot parse is not the
                        // gate's business to block
                        tracing::warn!(error = %e, "model gate skipped, body is not valid JSON");
                    }
                }
            }

            reqwest::Body::from(bytes)
        } else {
            reqwest::Body::wrap_stream(body.into_data_stream())
        };

        let outbound_headers = self.build_outbound_headers(&inbound_headers)?;

        let timeout_seconds = config.upstream.timeout_seconds;
        let outbound = self
            .state
            .http_client
            .request(method, &fetch_url)
            .headers(outbound_headers)
            .body(outbound_body);

        // The timer lives exactly as long as the send future; dropping it on
        // any exit path clears it, so nothing leaks under sustained load.
        let upstream = match tokio::time::timeout(
            Duration::from_secs(timeout_seconds),
            outbound.send(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(GatewayError::Timeout(timeout_seconds)),
        };

        let status = upstream.status();
        let response_headers = sanitize_response_headers(upstream.headers());

        tracing::debug!(status = %status, "streaming upstream response back");

        let mut builder = Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response_headers);
        }

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::Response(e.to_string()))
    }

    /// Assemble the outbound header set: Content-Type, Authorization
    /// passthrough, the provider's streaming-mode header, and any extra
    /// configured forward headers present on the inbound request.
    fn build_outbound_headers(
        &self,
        inbound: &HeaderMap,
    ) -> Result<HeaderMap, GatewayError> {
        let provider = &self.state.config.provider;
        let mut headers = HeaderMap::new();

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let authorization = inbound
            .get(header::AUTHORIZATION)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(""));
        headers.insert(header::AUTHORIZATION, authorization);

        let stream_header = HeaderName::from_bytes(provider.stream_header.as_bytes())
            .map_err(|e| GatewayError::InvalidHeader(e.to_string()))?;
        let stream_value = match inbound.get(&stream_header) {
            Some(value) => value.clone(),
            None => HeaderValue::from_str(&provider.stream_header_default)
                .map_err(|e| GatewayError::InvalidHeader(e.to_string()))?,
        };
        headers.insert(stream_header, stream_value);

        for name in &provider.forward_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::InvalidHeader(e.to_string()))?;
            if let Some(value) = inbound.get(&name) {
                headers.insert(name, value.clone());
            }
        }

        Ok(headers)
    }
}
