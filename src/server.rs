//! HTTP boundary
//!
//! `POST /run` executes one request, `GET /health` reports readiness. The body
//! shapes mirror what browser editors already send; everything past the
//! conversion into `ExecutionRequest` is the dispatcher's job.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SandboxConfig;
use crate::dispatch::Dispatcher;
use crate::domain::{
    ExecutionLimits, ExecutionRequest, ExecutionResult, ExecutionStatus, Reference,
};

/// Exit code reported for timed out runs, as `timeout(1)` does
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Upper bound for a per-request timeout override
const MAX_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
}

/// Body of `POST /run`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequestBody {
    pub language: String,
    #[serde(default)]
    pub source: Option<String>,
    /// Editor-style payload; the first file is the program
    #[serde(default)]
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub stdin: Option<String>,
    /// Binary stdin, takes precedence over `stdin`
    #[serde(default)]
    pub stdin_base64: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub reference: Option<Reference>,
}

impl RunRequestBody {
    pub fn into_request(self, defaults: &ExecutionLimits) -> Result<ExecutionRequest> {
        let source = match self.source {
            Some(source) => source,
            None => self
                .files
                .into_iter()
                .next()
                .map(|file| file.content)
                .unwrap_or_default(),
        };

        let mut limits = defaults.clone();
        if let Some(secs) = self.timeout_secs {
            limits.timeout = Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS));
        }

        let mut request = ExecutionRequest::new(self.language, source).with_limits(limits);

        if let Some(encoded) = self.stdin_base64 {
            let bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .context("stdin_base64 is not valid base64")?;
            request = request.with_stdin(bytes);
        } else if let Some(text) = self.stdin {
            request = request.with_stdin(text);
        }

        if let Some(reference) = self.reference {
            request = request.with_reference(reference);
        }

        Ok(request)
    }
}

/// Body of a `POST /run` reply, wrapped as `{"run": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReply {
    pub stdout: String,
    pub stderr: String,
    pub output: String,
    pub code: i32,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub truncated: bool,
    pub time_ms: u64,
}

impl From<ExecutionResult> for RunReply {
    fn from(result: ExecutionResult) -> Self {
        let code = if result.status == ExecutionStatus::Timeout {
            TIMEOUT_EXIT_CODE
        } else {
            result.exit_code
        };

        Self {
            stdout: result.stdout,
            stderr: result.stderr,
            output: result.output,
            code,
            status: result.status,
            expected_output: result.expected_output,
            is_correct: result.is_correct,
            truncated: result.truncated,
            time_ms: result.time_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub run: RunReply,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub code_execution: String,
    pub languages: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    permits: Arc<Semaphore>,
    limits: ExecutionLimits,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: &SandboxConfig) -> Self {
        Self {
            dispatcher,
            permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            limits: config.default_limits(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_code))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")?;
    Ok(())
}

async fn run_code(
    State(state): State<AppState>,
    Json(body): Json<RunRequestBody>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    let request = body.into_request(&state.limits).map_err(|e| {
        warn!("Bad run request: {:#}", e);
        (StatusCode::BAD_REQUEST, format!("{:#}", e))
    })?;

    let _permit = state.permits.acquire().await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server is shutting down".to_string(),
        )
    })?;

    let result = state.dispatcher.dispatch(request).await;
    Ok(Json(RunResponse { run: result.into() }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        code_execution: "direct_subprocess".to_string(),
        languages: state.dispatcher.supported_languages(),
    })
}
