//! Interception proxy between the page and the real backend
//!
//! An axum server bound to an ephemeral local port. Each request is matched
//! against the case's `Interceptor`:
//! - override rule: the upstream call is short-circuited and the configured
//!   response synthesized; an injected delay postpones only the release of
//!   the response (per-connection tasks keep other traffic flowing)
//! - observe rule: the request is forwarded upstream and the realized
//!   exchange recorded
//! - no rule: transparent forward, nothing recorded

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::intercept::{CompletedExchange, Interceptor, MatchToken};
use testwright_common::{Error, Method, ResponseOverride, Result};

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct ProxyState {
    interceptor: Interceptor,
    upstream: String,
    client: reqwest::Client,
}

/// Handle to a running interception proxy
pub struct InterceptProxy {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl InterceptProxy {
    /// Bind to an ephemeral local port and start serving.
    pub async fn start(interceptor: Interceptor, upstream: impl Into<String>) -> Result<Self> {
        let upstream = upstream.into().trim_end_matches('/').to_string();
        let state = ProxyState {
            interceptor,
            upstream,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        };

        let app = Router::new()
            .fallback(handle)
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "interception proxy listening");

        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(err) = server.await {
                warn!(%err, "interception proxy exited with error");
            }
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            task,
        })
    }

    /// Base URL the page should be pointed at
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop serving. Outstanding in-flight requests are abandoned with the
    /// rest of the case context.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for InterceptProxy {
    fn drop(&mut self) {
        self.stop();
        self.task.abort();
    }
}

async fn handle(State(state): State<ProxyState>, request: Request) -> Response {
    let wire_method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let method = Method::parse(request.method().as_str());
    let path_q = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let headers = request.headers().clone();

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "failed to buffer request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    // Methods outside the matcher vocabulary are forwarded untouched.
    let Some(method) = method else {
        return forward(&state, wire_method, &path_q, &headers, &body, None).await;
    };

    match state.interceptor.begin(method, &path_q) {
        Some(token) => match token.respond.clone() {
            Some(respond) => synthesize(&state, method, &path_q, &body, token, respond).await,
            None => {
                forward(&state, wire_method, &path_q, &headers, &body, Some((method, token))).await
            }
        },
        None => forward(&state, wire_method, &path_q, &headers, &body, None).await,
    }
}

/// Short-circuit the upstream call with the rule's configured response.
async fn synthesize(
    state: &ProxyState,
    method: Method,
    path_q: &str,
    request_body: &[u8],
    token: MatchToken,
    respond: ResponseOverride,
) -> Response {
    if let Some(delay_ms) = respond.delay_ms {
        debug!(rule = %token.rule_id, delay_ms, "holding synthesized response");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let mut headers = respond.headers.clone();
    if !respond.body.is_null() {
        headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/json".to_string());
    }

    state.interceptor.complete(
        token,
        CompletedExchange {
            method,
            path: path_q.to_string(),
            request_body: parse_body(request_body),
            status: respond.status,
            response_headers: headers.clone(),
            response_body: if respond.body.is_null() {
                None
            } else {
                Some(respond.body.clone())
            },
        },
    );

    let mut builder = Response::builder().status(respond.status);
    for (name, value) in &headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            builder = builder.header(name, value);
        }
    }
    let body = if respond.body.is_null() {
        Body::empty()
    } else {
        Body::from(respond.body.to_string())
    };
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Forward to the real backend; when `observe` is set, record the realized
/// exchange for the matched rule.
async fn forward(
    state: &ProxyState,
    wire_method: reqwest::Method,
    path_q: &str,
    headers: &HeaderMap,
    body: &[u8],
    observe: Option<(Method, MatchToken)>,
) -> Response {
    let url = format!("{}{}", state.upstream, path_q);
    let mut builder = state.client.request(wire_method, &url);
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            builder = builder.header(name.as_str(), value);
        }
    }
    if !body.is_empty() {
        builder = builder.body(body.to_vec());
    }

    let upstream = match builder.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(%url, %err, "upstream unreachable");
            if let Some((method, token)) = observe {
                state.interceptor.complete(
                    token,
                    CompletedExchange {
                        method,
                        path: path_q.to_string(),
                        request_body: parse_body(body),
                        status: 502,
                        response_headers: HashMap::new(),
                        response_body: None,
                    },
                );
            }
            return (StatusCode::BAD_GATEWAY, Error::Proxy(err.to_string()).to_string())
                .into_response();
        }
    };

    let status = upstream.status();
    let response_headers: HashMap<String, String> = upstream
        .headers()
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();
    let bytes = upstream.bytes().await.unwrap_or_default();

    if let Some((method, token)) = observe {
        state.interceptor.complete(
            token,
            CompletedExchange {
                method,
                path: path_q.to_string(),
                request_body: parse_body(body),
                status: status.as_u16(),
                response_headers: response_headers.clone(),
                response_body: parse_body(&bytes),
            },
        );
    }

    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in &response_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn parse_body(bytes: &[u8]) -> Option<serde_json::Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "host" | "content-length" | "transfer-encoding" | "connection" | "keep-alive" | "upgrade"
    )
}
