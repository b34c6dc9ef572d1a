//! Page API handlers and the mapping from service errors to API errors.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::Span;

use crate::application::pagination::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageWindow};
use crate::application::query::{DEFAULT_POST_LIMIT, QueryError};
use crate::application::repos::{PageListFilter, RepoError};
use crate::application::resolver::ResolveError;
use crate::application::summary::SummaryError;

use super::error::{ApiError, codes};
use super::state::ApiState;

const DEFAULT_LIST_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct PageListQuery {
    pub min_followers: Option<u64>,
    pub max_followers: Option<u64>,
    pub industry: Option<String>,
    pub name: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub limit: Option<u32>,
}

pub async fn index() -> impl IntoResponse {
    Json(json!({ "message": "pagelens is running" }))
}

pub async fn get_page(
    State(state): State<ApiState>,
    Path(page_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    record_page_id(&page_id);
    let page = state
        .resolver
        .resolve(&page_id)
        .await
        .map_err(resolve_to_api)?;
    Ok(Json(page))
}

pub async fn list_pages(
    State(state): State<ApiState>,
    query: Result<Query<PageListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(query_rejection)?;

    let limit = bounded_limit(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
    let window = PageWindow::from_page_number(query.page.unwrap_or(1), limit)
        .map_err(|err| ApiError::bad_request("page must be at least 1").with_hint(err.to_string()))?;

    let filter = PageListFilter {
        min_followers: query.min_followers,
        max_followers: query.max_followers,
        industry: query.industry,
        name: query.name,
    };

    let pages = state
        .queries
        .list(filter, window)
        .await
        .map_err(query_to_api)?;
    Ok(Json(pages))
}

pub async fn list_posts(
    State(state): State<ApiState>,
    Path(page_id): Path<String>,
    query: Result<Query<PostListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    record_page_id(&page_id);
    let Query(query) = query.map_err(query_rejection)?;
    let limit = bounded_limit(query.limit.unwrap_or(DEFAULT_POST_LIMIT))?;

    let posts = state
        .queries
        .get_posts(&page_id, limit)
        .await
        .map_err(query_to_api)?;
    Ok(Json(posts))
}

pub async fn list_employees(
    State(state): State<ApiState>,
    Path(page_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    record_page_id(&page_id);
    let employees = state
        .queries
        .get_employees(&page_id)
        .await
        .map_err(query_to_api)?;
    Ok(Json(employees))
}

pub async fn get_summary(
    State(state): State<ApiState>,
    Path(page_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    record_page_id(&page_id);
    let summary = state
        .summaries
        .summarize(&page_id)
        .await
        .map_err(summary_to_api)?;
    Ok(Json(summary))
}

fn bounded_limit(limit: u32) -> Result<u32, ApiError> {
    if (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&limit) {
        Ok(limit)
    } else {
        Err(ApiError::bad_request("limit out of range").with_hint(format!(
            "limit must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, got {limit}"
        )))
    }
}

/// Tag the request span so every log line of this request carries the page.
fn record_page_id(page_id: &str) {
    Span::current().record("page_id", page_id);
}

fn query_rejection(err: QueryRejection) -> ApiError {
    ApiError::bad_request("invalid query parameters").with_hint(err.body_text())
}

fn repo_to_api(err: &RepoError) -> ApiError {
    match err {
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "database timeout",
        ),
        RepoError::InvalidInput { message } => {
            ApiError::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "invalid input")
                .with_hint(message.clone())
        }
        other => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::STORE_UNAVAILABLE,
            "page store unavailable",
        )
        .with_hint(other.to_string()),
    }
}

fn resolve_to_api(err: ResolveError) -> ApiError {
    let api = match &err {
        ResolveError::InvalidIdentifier(inner) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_IDENTIFIER,
            "invalid page identifier",
        )
        .with_hint(inner.to_string()),
        ResolveError::StoreUnavailable(inner) => repo_to_api(inner),
        ResolveError::AcquisitionFailed { .. } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::ACQUISITION_FAILED,
            "page acquisition failed",
        )
        .with_hint(err.to_string()),
        ResolveError::PersistenceFailed { .. } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::PERSISTENCE_FAILED,
            "acquired page could not be stored",
        )
        .with_hint(err.to_string()),
    };
    api.caused_by("application::resolver", &err)
}

fn query_to_api(err: QueryError) -> ApiError {
    let api = match &err {
        QueryError::Invalid(inner) => {
            ApiError::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "invalid input")
                .with_hint(inner.to_string())
        }
        QueryError::Store(inner) => repo_to_api(inner),
    };
    api.caused_by("application::query", &err)
}

fn summary_to_api(err: SummaryError) -> ApiError {
    match err {
        SummaryError::NotFound(page_id) => ApiError::not_found("page not found")
            .with_hint(format!("resolve `{page_id}` before requesting a summary")),
        SummaryError::Lookup(err) => resolve_to_api(err),
        SummaryError::Upstream(err) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::SUMMARIZER,
            "summary could not be generated",
        )
        .with_hint(err.to_string())
        .caused_by("application::summary", &err),
    }
}
