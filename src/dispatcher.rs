use crate::error::{Error, Result};
use crate::model::{
    BatchSummary, ErrorCode, ModelResult, PromptRequest, ProviderKind, TestOptions,
};
use crate::providers::ProviderAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, instrument, warn};

/// How adapter calls within one batch are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One model at a time, in input order.
    #[default]
    Sequential,
    /// Fan out with at most `max_in_flight` calls running at once.
    Concurrent { max_in_flight: usize },
}

impl DispatchMode {
    pub fn concurrent(max_in_flight: usize) -> Self {
        DispatchMode::Concurrent {
            max_in_flight: max_in_flight.max(1),
        }
    }
}

/// Results of one batch, in the same order as the requested models.
#[derive(Debug, Clone)]
pub struct Batch {
    pub results: Vec<ModelResult>,
    pub summary: BatchSummary,
}

/// Routes each requested model to its provider adapter and aggregates the
/// outcome. Holds nothing but the adapter handles it was built with.
#[derive(Clone, Default)]
pub struct Dispatcher {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            adapters: HashMap::new(),
            mode,
        }
    }

    /// Registers an adapter under the provider it reports. A later adapter
    /// for the same provider replaces the earlier one.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    fn route(&self, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        ProviderKind::classify(model).and_then(|kind| self.adapters.get(&kind).cloned())
    }

    #[instrument(skip_all, fields(models = request.models().len(), mode = ?self.mode))]
    pub async fn dispatch(&self, request: &PromptRequest) -> Result<Batch> {
        let prompt: Arc<str> = Arc::from(request.prompt());
        let options = request.options();

        let results = match self.mode {
            DispatchMode::Sequential => {
                self.run_sequential(request.models(), prompt, options)
                    .await?
            }
            DispatchMode::Concurrent { max_in_flight } => {
                self.run_concurrent(request.models(), prompt, options, max_in_flight)
                    .await?
            }
        };

        let summary = BatchSummary::from_results(&results);
        info!(
            successful = summary.successful_models,
            failed = summary.failed_models,
            total_cost = summary.total_cost,
            avg_ms = summary.avg_response_time_ms,
            "batch complete"
        );

        Ok(Batch { results, summary })
    }

    async fn run_sequential(
        &self,
        models: &[String],
        prompt: Arc<str>,
        options: TestOptions,
    ) -> Result<Vec<ModelResult>> {
        let mut results = Vec::with_capacity(models.len());
        for model in models {
            let result = match self.route(model) {
                Some(adapter) => {
                    let handle = spawn_test(adapter, prompt.clone(), model.clone(), options, None);
                    settle(handle.await, model, &prompt)?
                }
                None => unsupported(model, &prompt),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn run_concurrent(
        &self,
        models: &[String],
        prompt: Arc<str>,
        options: TestOptions,
        max_in_flight: usize,
    ) -> Result<Vec<ModelResult>> {
        let permits = Arc::new(Semaphore::new(max_in_flight));

        // Handles are kept in input order; awaiting them in that order keeps
        // the output aligned with the request regardless of finish order.
        let pending: Vec<Option<JoinHandle<ModelResult>>> = models
            .iter()
            .map(|model| {
                self.route(model).map(|adapter| {
                    let permits = Some(permits.clone());
                    spawn_test(adapter, prompt.clone(), model.clone(), options, permits)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(models.len());
        for (model, handle) in models.iter().zip(pending) {
            let result = match handle {
                Some(handle) => settle(handle.await, model, &prompt)?,
                None => unsupported(model, &prompt),
            };
            results.push(result);
        }
        Ok(results)
    }
}

fn spawn_test(
    adapter: Arc<dyn ProviderAdapter>,
    prompt: Arc<str>,
    model: String,
    options: TestOptions,
    permits: Option<Arc<Semaphore>>,
) -> JoinHandle<ModelResult> {
    tokio::spawn(async move {
        // The semaphore is never closed, so acquire only fails if it were.
        let _permit = match permits {
            Some(permits) => permits.acquire_owned().await.ok(),
            None => None,
        };
        adapter.test(&prompt, &model, options).await
    })
}

fn unsupported(model: &str, prompt: &str) -> ModelResult {
    warn!(model, "no provider serves this model id");
    ModelResult::unsupported(model, prompt)
}

/// A panicking adapter becomes an inline failure. A cancelled task means the
/// runtime is shutting down underneath us, which aborts the whole batch.
fn settle(
    joined: std::result::Result<ModelResult, JoinError>,
    model: &str,
    prompt: &str,
) -> Result<ModelResult> {
    match joined {
        Ok(result) => Ok(result),
        Err(e) if e.is_panic() => {
            let provider = ProviderKind::classify(model)
                .map(|k| k.as_str())
                .unwrap_or("unknown");
            let message = panic_message(e.into_panic());
            warn!(model, provider, "adapter panicked: {}", message);
            Ok(ModelResult::failure(
                model,
                provider,
                prompt,
                ErrorCode::AdapterPanic,
                format!("adapter panicked: {}", message),
                0,
            ))
        }
        Err(e) => Err(Error::Internal {
            operation: format!("run model {}: {}", model, e),
        }),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
