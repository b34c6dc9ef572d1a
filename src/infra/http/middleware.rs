use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, error, field, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Runs each request inside a `request` span and echoes its id back.
///
/// An incoming `x-request-id` is reused when it is short printable ASCII.
/// Handlers fill the span's `page_id` field; failed responses are logged
/// with the cause chain their [`ErrorReport`] carries.
pub async fn trace_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|value| accepted_request_id(value))
        .cloned()
        .unwrap_or_else(generated_request_id);

    let span = info_span!(
        "request",
        request_id = request_id.to_str().unwrap_or_default(),
        method = %request.method(),
        path = %request.uri().path(),
        page_id = field::Empty,
    );
    let start = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let elapsed_ms = start.elapsed().as_millis();
        span.in_scope(|| log_failure(status.as_u16(), elapsed_ms, report));
    }

    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id);
    response
}

fn log_failure(status: u16, elapsed_ms: u128, report: Option<ErrorReport>) {
    let (origin, chain) = match report {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = chain.first().map_or("no diagnostic available", String::as_str);

    if status >= 500 {
        error!(
            target = "pagelens::http::response",
            status,
            elapsed_ms,
            origin,
            detail,
            chain = ?chain,
            "request failed"
        );
    } else {
        warn!(
            target = "pagelens::http::response",
            status,
            elapsed_ms,
            origin,
            detail,
            "request rejected"
        );
    }
}

fn accepted_request_id(value: &HeaderValue) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_REQUEST_ID_LEN
        && bytes.iter().all(|byte| byte.is_ascii_graphic())
}

fn generated_request_id() -> HeaderValue {
    let id = Uuid::new_v4().hyphenated().to_string();
    HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_must_be_short_printable_ascii() {
        assert!(accepted_request_id(&HeaderValue::from_static("req-42")));
        assert!(!accepted_request_id(&HeaderValue::from_static("")));
        assert!(!accepted_request_id(&HeaderValue::from_static("two words")));
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        assert!(!accepted_request_id(
            &HeaderValue::from_str(&long).expect("ascii header")
        ));
    }

    #[test]
    fn generated_ids_are_uuids() {
        let value = generated_request_id();
        let text = value.to_str().expect("ascii");
        assert!(Uuid::parse_str(text).is_ok());
    }
}
