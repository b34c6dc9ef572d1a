//! JSON error responses for the page API.
//!
//! The body carries a stable `code` for clients. The full cause chain rides
//! along as an [`ErrorReport`] extension for the response logger and never
//! reaches the client.

use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_IDENTIFIER: &str = "invalid_identifier";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const ACQUISITION_FAILED: &str = "acquisition_failed";
    pub const PERSISTENCE_FAILED: &str = "persistence_failed";
    pub const SUMMARIZER: &str = "summarizer_error";
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

#[derive(Serialize)]
struct Body<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
            hint: None,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Record `err` and its sources for the response log.
    pub fn caused_by(mut self, origin: &'static str, err: &dyn StdError) -> Self {
        self.report = Some(ErrorReport::from_error(origin, self.status, err));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            error: Body {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();

        let report = self.report.unwrap_or_else(|| {
            let detail = self.hint.as_deref().unwrap_or(self.message);
            ErrorReport::from_message(
                "infra::http::api",
                self.status,
                format!("{}: {detail}", self.code),
            )
        });
        report.attach(&mut response);
        response
    }
}
