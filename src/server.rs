//! HTTP endpoint exposing the aggregator.
//!
//! `GET /merger` takes arbitrary query parameters, forwards the caller
//! identity header, and always answers `200` with the composite JSON.

use crate::aggregate::Aggregator;
use crate::cli::DEFAULT_CALLER;
use crate::models::{CompositeResult, Params, RequestContext};
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/merger", get(merger))
        .with_state(state)
}

async fn merger(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Json<CompositeResult> {
    let caller = headers
        .get(state.aggregator.fetcher().caller_header())
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CALLER)
        .to_string();

    debug!("Merger request from '{}' with {} params", caller, params.len());

    let ctx = RequestContext::new(params, caller);
    Json(state.aggregator.aggregate(&ctx).await)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Serving aggregation endpoint on http://{}/merger", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")
}
