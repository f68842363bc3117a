use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use underhood_index::QueryError;

/// Every failure a request can end in. All of them are answered the same
/// way: status 418 with the message as a plain-text body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("expected a `{0}` parameter")]
    MissingParameter(&'static str),
    #[error("expected a single `{0}` parameter")]
    RepeatedParameter(&'static str),
    #[error("expected a ticket in repository:path form, got `{0}`")]
    IncompleteTicket(String),
    #[error("repository-only queries are not supported")]
    RepoOnlyQuery,
    #[error("query error: {0}")]
    Query(#[from] QueryError),
    #[error("search failed: {0:#}")]
    Backend(#[from] anyhow::Error),
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "request failed");
        (
            StatusCode::IM_A_TEAPOT,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
