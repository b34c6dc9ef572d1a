pub mod error;
pub mod handlers;
pub mod state;

pub use state::ApiState;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::infra::http::middleware::trace_requests;

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/v1/pages", get(handlers::list_pages))
        .route("/api/v1/pages/{page_id}", get(handlers::get_page))
        .route("/api/v1/pages/{page_id}/posts", get(handlers::list_posts))
        .route(
            "/api/v1/pages/{page_id}/employees",
            get(handlers::list_employees),
        )
        .route("/api/v1/pages/{page_id}/summary", get(handlers::get_summary))
        .with_state(state)
        .layer(axum_middleware::from_fn(trace_requests))
}
