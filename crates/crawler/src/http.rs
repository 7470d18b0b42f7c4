//! HTTP surface: crawl triggers, introspection and metrics.

use crate::ingest::{IngestSink, JobIngestor};
use crate::metrics::{metrics_handler, Metrics};
use crate::orchestrator::{CrawlOptions, CrawlOrchestrator};
use crate::scheduler::ScheduledRunner;
use axum::extract::{FromRef, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use job_hive_common::{CrawlConfig, CrawlRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_JOBS_LIMIT: usize = 50;
const MAX_JOBS_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CrawlOrchestrator>,
    pub runner: Arc<ScheduledRunner>,
    pub ingestor: JobIngestor,
    pub metrics: Metrics,
    pub crawl: CrawlConfig,
}

impl FromRef<AppState> for Metrics {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlAccepted {
    message: String,
    strategy: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/crawl", post(trigger_crawl))
        .route("/strategies", get(list_strategies))
        .route("/jobs", get(list_jobs))
        .route("/pool", get(pool_status))
        .route("/scheduler/run", post(trigger_round))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Start a crawl in the background. The response only says it was accepted.
async fn trigger_crawl(
    State(state): State<AppState>,
    body: Option<Json<CrawlRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let strategy = request
        .strategy
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.crawl.default_strategy.clone());

    if !state.orchestrator.has_strategy(&strategy) {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("strategy '{}' not found", strategy),
                available: Some(state.orchestrator.strategy_names()),
            }),
        )
            .into_response();
    }

    let sink = Arc::new(IngestSink::new(
        strategy.clone(),
        state.ingestor.clone(),
        state.metrics.clone(),
    ));
    let options = CrawlOptions {
        keyword: request.keyword,
        max_results: request.max_results,
        headless: state.crawl.headless,
        sink: Some(sink.clone()),
    };

    info!(strategy = %strategy, "Crawl accepted via HTTP");
    let orchestrator = state.orchestrator.clone();
    let metrics = state.metrics.clone();
    let name = strategy.clone();
    tokio::spawn(async move {
        match orchestrator.crawl(&name, options).await {
            Ok(_) => info!(
                strategy = %name,
                "HTTP crawl finished: {} saved, {} skipped",
                sink.saved(),
                sink.skipped()
            ),
            Err(e) => {
                metrics
                    .crawl_failures
                    .with_label_values(&[name.as_str()])
                    .inc();
                error!(strategy = %name, "HTTP crawl failed: {}", e);
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(CrawlAccepted {
            message: "Crawl started".to_string(),
            strategy,
            status: "processing",
        }),
    )
        .into_response()
}

async fn list_strategies(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "strategies": state.orchestrator.strategy_names() }))
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobsQuery>) -> Response {
    let limit = query
        .limit
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_JOBS_LIMIT)
        .min(MAX_JOBS_LIMIT);

    match state.ingestor.store().list_recent(limit).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => {
            error!("Failed to list jobs: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "failed to list jobs".to_string(),
                    available: None,
                }),
            )
                .into_response()
        }
    }
}

async fn pool_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.pool().status().await)
}

/// Run a collection round now, unless one is already running
async fn trigger_round(State(state): State<AppState>) -> Response {
    let Some(permit) = state.runner.try_begin() else {
        return (
            StatusCode::CONFLICT,
            Json(StatusBody {
                status: "skipped",
                message: "A collection round is already running",
            }),
        )
            .into_response();
    };

    let runner = state.runner.clone();
    tokio::spawn(async move {
        runner.run_round(permit).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(StatusBody {
            status: "processing",
            message: "Collection round started",
        }),
    )
        .into_response()
}
