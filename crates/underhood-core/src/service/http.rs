use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::telemetry;
use crate::ticket::Ticket;
use crate::translate::{Casing, SearchMode};

use super::error::ApiError;
use super::server::{DEFAULT_NUM_RESULTS, Gateway, XrefRequest};

type SharedGateway = Arc<Gateway>;
type Params = Vec<(String, String)>;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

#[derive(Serialize)]
struct DecorsResponse {
    decors: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(gateway: SharedGateway) -> Router {
    Router::new()
        .route("/api/filetree", get(file_tree))
        .route("/api/source", get(source))
        .route("/api/decor", get(decors))
        .route("/api/search-xref", get(search_xref))
        .route("/search", get(search))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .with_state(gateway)
}

/// Start the HTTP server and run until shutdown.
pub async fn serve(addr: SocketAddr, gateway: SharedGateway) -> Result<()> {
    let app = router(gateway);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP address {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .with_context(|| format!("failed to run HTTP server on {addr}"))
}

fn values<'a>(params: &'a Params, name: &'a str) -> impl Iterator<Item = &'a str> {
    params
        .iter()
        .filter(move |(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn first<'a>(params: &'a Params, name: &'a str) -> Option<&'a str> {
    values(params, name).next()
}

/// At most one value; a repeated parameter is an error.
fn single<'a>(params: &'a Params, name: &'static str) -> Result<Option<&'a str>, ApiError> {
    let mut found = values(params, name);
    let value = found.next();
    if found.next().is_some() {
        return Err(ApiError::RepeatedParameter(name));
    }
    Ok(value)
}

fn required<'a>(params: &'a Params, name: &'static str) -> Result<&'a str, ApiError> {
    single(params, name)?
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingParameter(name))
}

fn json<T: Serialize>(body: &T) -> Response {
    ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], Json(body)).into_response()
}

async fn observe<F>(endpoint: &'static str, handler: F) -> Result<Response, ApiError>
where
    F: Future<Output = Result<Response, ApiError>>,
{
    let start = Instant::now();
    let result = handler.await;
    telemetry::record_request(endpoint, start.elapsed().as_millis() as u64, result.is_ok());
    result
}

async fn file_tree(
    State(gateway): State<SharedGateway>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    observe("filetree", async {
        let top = Ticket::parse(first(&params, "top").unwrap_or_default());
        tracing::info!(top = %top, "filetree");
        let tree = gateway.file_tree(&top).await?;
        Ok(json(&tree))
    })
    .await
}

async fn source(
    State(gateway): State<SharedGateway>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    observe("source", async {
        let ticket = Ticket::parse(required(&params, "ticket")?);
        tracing::info!(ticket = %ticket, "source");
        let content = gateway.source(&ticket).await?;
        Ok(([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], content).into_response())
    })
    .await
}

async fn decors() -> Response {
    json(&DecorsResponse { decors: Vec::new() })
}

async fn search_xref(
    State(gateway): State<SharedGateway>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    observe("search-xref", async {
        let request = XrefRequest {
            selection: required(&params, "selection")?.to_string(),
            reference: single(&params, "ticket")?
                .map(Ticket::parse)
                .unwrap_or_default(),
            casing: Casing::parse_or_default(first(&params, "casing")),
            mode: SearchMode::parse_or_default(first(&params, "mode")),
        };
        tracing::info!(
            selection = %request.selection,
            ticket = %request.reference,
            mode = ?request.mode,
            casing = request.casing.as_str(),
            "search-xref"
        );
        let xref = gateway.search_xref(&request).await?;
        Ok(json(&xref))
    })
    .await
}

async fn search(
    State(gateway): State<SharedGateway>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    observe("search", async {
        let text = required(&params, "q")?;
        let num = first(&params, "num")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|&num| num > 0)
            .unwrap_or(DEFAULT_NUM_RESULTS);
        tracing::info!(query = text, num, "search");
        let response = gateway.search(text, num).await?;
        Ok(json(&response))
    })
    .await
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics() -> Result<Response<Body>, StatusCode> {
    match telemetry::export_prometheus() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(body))
            .map_err(|err| {
                tracing::error!(error = %err, "failed to build metrics response");
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        Err(err) => {
            tracing::error!(error = %err, "failed to export metrics");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
