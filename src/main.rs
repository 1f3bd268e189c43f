use anyhow::Context;
use prompt_arena::catalog::ModelCatalog;
use prompt_arena::config::Config;
use prompt_arena::dispatcher::Dispatcher;
use prompt_arena::gateway::{router, AppState};
use prompt_arena::history::BatchHistory;
use prompt_arena::providers::{AnthropicAdapter, OpenAiAdapter, Simulator};
use prompt_arena::stats::StatsRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let catalog = match &config.catalog_path {
        Some(path) => ModelCatalog::from_file(path)?,
        None => ModelCatalog::builtin(),
    };
    let catalog = Arc::new(catalog);

    // One client per process, shared by both adapters.
    let mut client = reqwest::Client::builder();
    if let Some(timeout) = config.request_timeout {
        client = client.timeout(timeout);
    }
    let client = client.build().context("building HTTP client")?;

    for (name, settings) in [("OpenAI", &config.openai), ("Anthropic", &config.anthropic)] {
        if settings.api_key.is_none() {
            warn!("{} API key not configured, responses will be simulated", name);
        }
    }

    let simulator = Simulator::new(config.simulated_delay_ms.clone());
    let dispatcher = Dispatcher::new(config.dispatch_mode)
        .with_adapter(Arc::new(OpenAiAdapter::new(
            client.clone(),
            config.openai.clone(),
            catalog.clone(),
            simulator.clone(),
        )))
        .with_adapter(Arc::new(AnthropicAdapter::new(
            client,
            config.anthropic.clone(),
            catalog.clone(),
            simulator,
        )));

    let app_state = Arc::new(AppState {
        dispatcher,
        catalog,
        history: BatchHistory::new(config.history_capacity, config.history_ttl),
        stats: Arc::new(StatsRegistry::new()),
        catalog_path: config.catalog_path.clone(),
    });

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    info!(addr = %config.addr, mode = ?config.dispatch_mode, "prompt arena listening");

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
