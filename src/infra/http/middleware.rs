use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use studycache_api_types::headers::{CORRELATION_ID, REQUEST_ID};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    /// Header the id arrived on; echoed back under the same name.
    pub header: HeaderName,
}

/// Adopt the caller's correlation id (or mint one) and echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let incoming = [CORRELATION_ID, REQUEST_ID].into_iter().find_map(|name| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(|value| (HeaderName::from_static(name), value.to_string()))
    });
    let (header, correlation_id) = incoming.unwrap_or_else(|| {
        (
            HeaderName::from_static(CORRELATION_ID),
            Uuid::new_v4().to_string(),
        )
    });
    let ctx = RequestContext {
        correlation_id,
        header,
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.correlation_id) {
        response.headers_mut().insert(ctx.header.clone(), value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.correlation_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target: "studycache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                correlation_id = correlation_id,
                "request failed",
            );
        } else {
            warn!(
                target: "studycache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                correlation_id = correlation_id,
                "client request error",
            );
        }
    }

    response
}
