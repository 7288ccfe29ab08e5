//! HTTP server implementation using Axum.
//!
//! Every visitor hits the same buffer, scratch file and package environment.
//! Handlers never take a lock: concurrent saves are last-write-wins and
//! concurrent executions each get their own child process.

use crate::engine::ExecutionResult;
use crate::error::{self, DashboardError};
use crate::packages::{InstallResult, PackageListing};
use crate::page::{self, DashboardView, Notice};
use crate::state::AppState;
use crate::telemetry::{self, TelemetrySnapshot};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Marks a browser session as already counted.
pub const VISITED_COOKIE: &str = "codeboard_visited";

// Request/Response types
#[derive(Deserialize)]
struct SourceForm {
    #[serde(default)]
    source: String,
}

#[derive(Deserialize)]
struct InstallForm {
    #[serde(default)]
    package: String,
    #[serde(default)]
    suggested: String,
}

#[derive(Serialize, Deserialize)]
struct BufferBody {
    content: String,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    /// Runs the saved buffer when absent.
    source: Option<String>,
}

#[derive(Deserialize)]
struct InstallRequest {
    package: String,
}

type ApiError = (StatusCode, String);

fn api_error(e: DashboardError) -> ApiError {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(error = %e, "Request failed");
    (status, e.to_string())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Dashboard
        .route("/", get(index))
        .route("/save", post(save_form))
        .route("/execute", post(execute_form))
        .route("/install", post(install_form))
        // JSON API
        .route("/api/buffer", get(get_buffer).put(put_buffer))
        .route("/api/execute", post(execute_api))
        .route("/api/install", post(install_api))
        .route("/api/packages", get(list_packages))
        .route("/api/telemetry", get(get_telemetry))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server on `addr` with the provided state.
pub async fn run_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> &'static str {
    "OK"
}

fn has_visited(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == VISITED_COOKIE && value == "1")
}

/// Form submissions carry CRLF line endings; the buffer stores plain LF.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let first_visit = !has_visited(&headers);
    let counter = state.counter.clone();
    let counted = tokio::task::spawn_blocking(move || {
        if first_visit {
            counter.record_visit()
        } else {
            counter.current()
        }
    })
    .await;

    let mut view = DashboardView::default();
    match counted {
        Ok(Ok(n)) => view.visitor_number = Some(n),
        Ok(Err(e)) => warn!(error = %e, "Visitor counter unavailable"),
        Err(e) => warn!(error = %e, "Visitor counter task failed"),
    }
    match load_source(&state).await {
        Ok(source) => view.source = source,
        Err(e) => view.notices.push(Notice::Error(e.to_string())),
    }
    let html = render_dashboard(&state, view).await;

    if first_visit {
        let cookie = format!("{VISITED_COOKIE}=1; Path=/; HttpOnly; SameSite=Lax");
        ([(header::SET_COOKIE, cookie)], html).into_response()
    } else {
        html.into_response()
    }
}

async fn save_form(State(state): State<AppState>, Form(form): Form<SourceForm>) -> Html<String> {
    let source = normalize_newlines(&form.source);
    let mut view = DashboardView::default();
    match save_source(&state, source.clone()).await {
        Ok(()) => view.notices.push(Notice::Success("Code saved".to_string())),
        Err(e) => view
            .notices
            .push(Notice::Error(format!("Save failed: {e}"))),
    }
    view.source = source;
    render_dashboard(&state, view).await
}

async fn execute_form(State(state): State<AppState>, Form(form): Form<SourceForm>) -> Html<String> {
    let source = normalize_newlines(&form.source);
    let mut view = DashboardView::default();
    match state.engine.execute(&source).await {
        Ok(result) => view.execution = Some(result),
        Err(e) => view
            .notices
            .push(Notice::Error(format!("Execution failed: {e}"))),
    }
    view.source = source;
    render_dashboard(&state, view).await
}

async fn install_form(State(state): State<AppState>, Form(form): Form<InstallForm>) -> Html<String> {
    let package = if form.suggested.trim().is_empty() {
        form.package
    } else {
        form.suggested
    };
    let mut view = DashboardView::default();
    match state.packages.install(&package).await {
        Ok(result) => view.install = Some(result),
        Err(e) => view
            .notices
            .push(Notice::Error(format!("Install error: {e}"))),
    }
    match load_source(&state).await {
        Ok(source) => view.source = source,
        Err(e) => view.notices.push(Notice::Error(e.to_string())),
    }
    render_dashboard(&state, view).await
}

async fn get_buffer(State(state): State<AppState>) -> Result<Json<BufferBody>, ApiError> {
    let content = load_source(&state).await.map_err(api_error)?;
    Ok(Json(BufferBody { content }))
}

async fn put_buffer(
    State(state): State<AppState>,
    Json(body): Json<BufferBody>,
) -> Result<StatusCode, ApiError> {
    save_source(&state, body.content).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// An empty body runs the saved buffer, same as `{}`.
async fn execute_api(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, ApiError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        ExecuteRequest { source: None }
    } else {
        serde_json::from_slice::<ExecuteRequest>(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid request body: {e}")))?
    };
    let result = match req.source {
        Some(source) => state.engine.execute(&source).await,
        None => state.engine.execute_saved(&state.buffer).await,
    }
    .map_err(api_error)?;
    info!(run_id = %result.run_id, exit_code = ?result.exit_code, timed_out = result.timed_out, "POST /api/execute");
    Ok(Json(result))
}

async fn install_api(
    State(state): State<AppState>,
    Json(req): Json<InstallRequest>,
) -> Result<Json<InstallResult>, ApiError> {
    let result = state.packages.install(&req.package).await.map_err(api_error)?;
    Ok(Json(result))
}

async fn list_packages(State(state): State<AppState>) -> Result<Json<PackageListing>, ApiError> {
    let installed = state.packages.list_installed().await.map_err(api_error)?;
    Ok(Json(installed.display(state.config.package_display_limit)))
}

async fn get_telemetry(State(state): State<AppState>) -> Json<TelemetrySnapshot> {
    Json(telemetry::snapshot(&state.config.interpreter).await)
}

async fn load_source(state: &AppState) -> error::Result<String> {
    let buffer = state.buffer.clone();
    tokio::task::spawn_blocking(move || buffer.load()).await?
}

async fn save_source(state: &AppState, source: String) -> error::Result<()> {
    let buffer = state.buffer.clone();
    tokio::task::spawn_blocking(move || buffer.save(&source)).await?
}

/// Fill in telemetry and the package listing, then render.
async fn render_dashboard(state: &AppState, mut view: DashboardView) -> Html<String> {
    let (snapshot, installed) = tokio::join!(
        telemetry::snapshot(&state.config.interpreter),
        state.packages.list_installed()
    );
    view.telemetry = snapshot;
    view.packages = Some(
        installed
            .map(|installed| installed.display(state.config.package_display_limit))
            .map_err(|e| e.to_string()),
    );
    if view.visitor_number.is_none() {
        let counter = state.counter.clone();
        view.visitor_number = match tokio::task::spawn_blocking(move || counter.current()).await {
            Ok(count) => count.ok(),
            Err(e) => {
                warn!(error = %e, "Visitor counter task failed");
                None
            }
        };
    }
    Html(page::render(&view))
}
