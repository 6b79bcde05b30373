//! Gateway routing: every inbound request goes through the worker.
//!
//! The worker decides whether a request is served from cache, from the
//! network, or from an offline fallback. Requests the worker declines
//! (non-GET, inactive worker) are forwarded to the origin untouched.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use haven_core::config::AppConfig;
use haven_worker::WorkerHost;
use haven_worker::events::{Destination, InterceptedRequest};
use haven_worker::interceptor::{InterceptedResponse, ResponseSource};
use serde_json::json;
use tower_http::trace::TraceLayer;
use url::Url;

/// Headers never copied onto an outgoing response. Bodies are held
/// decompressed and framed by the server, so the stored values would lie.
const SKIPPED_HEADERS: &[&str] = &["content-length", "transfer-encoding", "content-encoding", "connection"];

const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

pub struct GatewayState {
    host: Arc<WorkerHost>,
    origin: Url,
    upstream: reqwest::Client,
}

pub fn router(host: Arc<WorkerHost>, config: &AppConfig) -> Result<Router> {
    let origin = Url::parse(&config.origin)?;
    let upstream = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    let state = Arc::new(GatewayState { host, origin, upstream });

    Ok(Router::new()
        .route("/__haven/health", get(health))
        .fallback(gateway)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    let state_name = state.host.state().await.to_string();
    Json(json!({ "status": "ok", "worker": state_name })).into_response()
}

/// Fallback handler: map the inbound request onto the worker, then serve
/// whatever it produced.
async fn gateway(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let intercepted = match to_intercepted(&state.origin, &request) {
        Ok(intercepted) => intercepted,
        Err(response) => return response,
    };

    match state.host.fetch(intercepted).await {
        Ok(Some(response)) => to_response(response),
        Ok(None) => pass_through(&state, request).await,
        Err(e) => {
            tracing::warn!(error = %e, "worker could not answer request");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn to_intercepted(origin: &Url, request: &Request) -> Result<InterceptedRequest, Response> {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = origin
        .join(path)
        .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;

    let headers = request.headers();
    let destination = Destination::from_hints(header_str(headers, "sec-fetch-dest"), header_str(headers, "accept"));

    Ok(InterceptedRequest {
        method: request.method().clone(),
        url,
        destination,
        accept: header_str(headers, "accept").map(str::to_string),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn to_response(response: InterceptedResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder()
        .status(status)
        .header("x-haven-source", source_label(response.source));

    for (name, value) in &response.headers {
        if SKIPPED_HEADERS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn source_label(source: ResponseSource) -> &'static str {
    match source {
        ResponseSource::Cache => "cache",
        ResponseSource::Network => "network",
        ResponseSource::OfflineFallback => "offline-fallback",
        ResponseSource::Synthesized => "synthesized",
    }
}

/// Forward a declined request to the origin as-is.
async fn pass_through(state: &GatewayState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = match state.origin.join(path) {
        Ok(url) => url,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let body = match to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let mut outbound = state.upstream.request(parts.method, url).body(body);
    for name in ["accept", "content-type", "authorization", "cookie"] {
        if let Some(value) = parts.headers.get(name) {
            outbound = outbound.header(name, value);
        }
    }

    match outbound.send().await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut builder = Response::builder().status(status);
            for (name, value) in upstream.headers() {
                if SKIPPED_HEADERS.contains(&name.as_str()) {
                    continue;
                }
                builder = builder.header(name, value);
            }
            match upstream.bytes().await {
                Ok(bytes) => builder
                    .body(Body::from(bytes))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
                Err(e) => {
                    tracing::warn!(error = %e, "upstream body read failed");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "upstream request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "origin unreachable" })),
            )
                .into_response()
        }
    }
}
