use crate::catalog::{CatalogEntry, ModelCatalog};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::history::{prompt_hash, BatchHistory, HistorySummary, TestRecord};
use crate::model::{
    BatchSummary, ModelResult, PromptRequest, DEFAULT_ITERATIONS, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
use crate::stats::{ModelStatsSnapshot, StatsRegistry};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: usize = 20;

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub catalog: Arc<ModelCatalog>,
    pub history: BatchHistory,
    pub stats: Arc<StatsRegistry>,
    /// Source file for `POST /models/reload`; `None` serves the builtin list.
    pub catalog_path: Option<PathBuf>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/prompts/test", post(handle_test_prompt))
        .route("/prompts/history", get(handle_history))
        .route("/prompts/:test_id", get(handle_get_test))
        .route("/models", get(handle_list_models))
        .route("/models/reload", post(handle_reload_models))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Body of `POST /prompts/test`. Every field is optional on the wire so that
/// a missing prompt or model list is reported as a validation error rather
/// than a deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPromptBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub iterations: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl TryFrom<TestPromptBody> for PromptRequest {
    type Error = Error;

    fn try_from(body: TestPromptBody) -> Result<Self> {
        let prompt = body.prompt.unwrap_or_default();
        PromptRequest::builder(prompt, body.models.unwrap_or_default())
            .temperature(body.temperature.unwrap_or(DEFAULT_TEMPERATURE))
            .max_tokens(body.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
            .iterations(body.iterations.unwrap_or(DEFAULT_ITERATIONS))
            .build()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPromptResponse {
    pub success: bool,
    pub test_id: Uuid,
    pub prompt: String,
    pub models: Vec<String>,
    pub iterations: u32,
    pub results: Vec<ModelResult>,
    pub summary: BatchSummary,
    pub timestamp: DateTime<Utc>,
}

pub async fn handle_test_prompt(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<TestPromptBody>, JsonRejection>,
) -> Result<Json<TestPromptResponse>> {
    let Json(body) = body.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let request = PromptRequest::try_from(body)?;

    let start = Instant::now();
    let batch = state.dispatcher.dispatch(&request).await?;
    state.stats.record_batch(&batch.results);

    let response = TestPromptResponse {
        success: true,
        test_id: Uuid::new_v4(),
        prompt: request.prompt().to_string(),
        models: request.models().to_vec(),
        iterations: request.iterations(),
        results: batch.results,
        summary: batch.summary,
        timestamp: Utc::now(),
    };

    info!(
        test_id = %response.test_id,
        models = response.models.len(),
        successful = response.summary.successful_models,
        "Prompt test processed in {:?}",
        start.elapsed()
    );

    state
        .history
        .put(TestRecord {
            test_id: response.test_id,
            prompt: response.prompt.clone(),
            prompt_hash: prompt_hash(&response.prompt),
            models: response.models.clone(),
            iterations: response.iterations,
            results: response.results.clone(),
            summary: response.summary.clone(),
            timestamp: response.timestamp,
        })
        .await;

    Ok(Json(response))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<CatalogEntry>,
    pub count: usize,
    pub providers: BTreeMap<String, usize>,
}

pub async fn handle_list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let models = state.catalog.list_available().as_ref().clone();
    Json(ModelsResponse {
        success: true,
        count: models.len(),
        providers: state.catalog.provider_counts(),
        models,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub count: usize,
    pub providers: BTreeMap<String, usize>,
}

pub async fn handle_reload_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>> {
    let Some(path) = state.catalog_path.as_deref() else {
        return Err(Error::validation("No catalog file configured; set ARENA_CATALOG_PATH"));
    };
    let count = state.catalog.reload_from(path)?;
    info!(count, path = %path.display(), "Model catalog reloaded");

    Ok(Json(ReloadResponse {
        success: true,
        count,
        providers: state.catalog.provider_counts(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub tests: Vec<HistorySummary>,
    pub count: usize,
}

pub async fn handle_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let tests = state.history.recent(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
    Json(HistoryResponse {
        success: true,
        count: tests.len(),
        tests,
    })
}

#[derive(Debug, Serialize)]
pub struct TestRecordResponse {
    pub success: bool,
    pub test: TestRecord,
}

pub async fn handle_get_test(
    State(state): State<Arc<AppState>>,
    Path(test_id): Path<String>,
) -> Result<Json<TestRecordResponse>> {
    let not_found = || Error::NotFound {
        resource: "Test".to_string(),
        id: test_id.clone(),
    };
    let id = Uuid::parse_str(&test_id).map_err(|_| not_found())?;
    let record = state.history.get(&id).await.ok_or_else(not_found)?;

    Ok(Json(TestRecordResponse {
        success: true,
        test: record.as_ref().clone(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub models: Vec<ModelStatsSnapshot>,
}

pub async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        models: state.stats.snapshot(),
    })
}

pub async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
