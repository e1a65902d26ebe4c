//! Per-request tracing context.
//!
//! Every request gets a request id and a trace id (minted here unless an
//! upstream hop already set them), a tracing span carrying both, and one
//! completion log line with status and latency. The ids are echoed back in
//! the response headers so cross-service traces can be stitched together.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let request_id = incoming_id(request.headers(), REQUEST_ID_HEADER)
        .unwrap_or_else(|| mint_id("req"));
    let trace_id =
        incoming_id(request.headers(), TRACE_ID_HEADER).unwrap_or_else(|| mint_id("trace"));

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    echo_header(response.headers_mut(), REQUEST_ID_HEADER, &request_id);
    echo_header(response.headers_mut(), TRACE_ID_HEADER, &trace_id);

    tracing::info!(
        parent: &span,
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis(),
        "request completed"
    );

    response
}

fn incoming_id(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn mint_id(prefix: &str) -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis())
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{now_ms:012x}-{seq:08x}")
}

fn echo_header(headers: &mut HeaderMap, header_name: &'static str, value: &str) {
    if let Ok(header_value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(header_name), header_value);
    }
}
