// Web layer - Axum routes over the report engine
//
// Every request opens its own read-only connection on the blocking pool
// and is bounded by the configured query timeout. Nothing is shared
// between requests except the configuration.

use crate::config::Config;
use crate::db;
use crate::error::{ReportError, ReportResult};
use crate::render::{render_page, Selection};
use crate::reports::{run_report, ReportKind, ReportSource};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run `work` against a fresh read-only connection.
    ///
    /// On timeout the running statement is interrupted; the connection
    /// is dropped when the blocking task returns.
    async fn with_connection<T, F>(&self, work: F) -> ReportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ReportResult<T> + Send + 'static,
    {
        let path = self.config.db_path.clone();
        let timeout = self.config.query_timeout();
        let (handle_tx, mut handle_rx) = tokio::sync::oneshot::channel();

        let task = tokio::task::spawn_blocking(move || {
            let conn = db::open_read_only(&path, timeout)?;
            let _ = handle_tx.send(conn.get_interrupt_handle());
            work(&conn)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ReportError::Unavailable(format!(
                "report worker failed: {}",
                join_err
            ))),
            Err(_) => {
                if let Ok(handle) = handle_rx.try_recv() {
                    handle.interrupt();
                }
                Err(ReportError::Timeout(self.config.query_timeout_secs))
            }
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(error: &ReportError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

fn status_for(err: &ReportError) -> StatusCode {
    match err {
        ReportError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        ReportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ReportError::DataAccess(_) | ReportError::Unavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    query: Option<String>,
    year: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    year: Option<i32>,
}

fn parse_year(raw: Option<&str>, default_year: i32) -> ReportResult<i32> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default_year),
        Some(s) => s
            .parse()
            .map_err(|_| ReportError::invalid(format!("year must be a number, got {:?}", s))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - Report page, `?query=<report>&year=<year>` runs one report
async fn index(State(state): State<AppState>, Query(params): Query<PageParams>) -> Response {
    let default_year = state.config.default_year;
    let year_input = params.year.as_deref();

    let kind = match params.query.as_deref().filter(|q| !q.is_empty()) {
        None => None,
        Some(key) => match key.parse::<ReportKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                tracing::debug!(query = key, "ignoring unknown report key");
                None
            }
        },
    };

    let Some(kind) = kind else {
        return Html(render_page(&Selection::Nothing, default_year)).into_response();
    };

    let result = match parse_year(year_input, default_year) {
        Ok(year) => state
            .with_connection(move |conn| run_report(conn, kind, year))
            .await
            .map(|report| (year, report)),
        Err(e) => Err(e),
    };

    match result {
        Ok((year, report)) => Html(render_page(&Selection::Report(&report), year)).into_response(),
        Err(e) => {
            tracing::error!(report = %kind, error = %e, "report failed");
            let message = e.to_string();
            let page = render_page(
                &Selection::Failed {
                    kind,
                    message: &message,
                },
                default_year,
            );
            (status_for(&e), Html(page)).into_response()
        }
    }
}

/// GET /health - Database connectivity check
async fn health(State(state): State<AppState>) -> Response {
    match state.with_connection(db::ping).await {
        Ok(()) => Json(serde_json::json!({"status": "ok", "database": "connected"})).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "detail": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// GET /api/stats - Headline counts
async fn api_stats(State(state): State<AppState>) -> Response {
    match state.with_connection(|conn| conn.stats()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "stats failed");
            (
                status_for(&e),
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// GET /api/reports/:kind - One report as JSON
async fn api_report(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<ReportParams>,
) -> Response {
    let year = params.year.unwrap_or(state.config.default_year);

    let result = match key.parse::<ReportKind>() {
        Ok(kind) => {
            state
                .with_connection(move |conn| run_report(conn, kind, year))
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::ok(report))).into_response(),
        Err(e) => {
            tracing::error!(report = %key, error = %e, "report failed");
            (status_for(&e), Json(ApiResponse::<()>::err(&e))).into_response()
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/stats", get(api_stats))
        .route("/reports/:kind", get(api_report));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
