//! Fake upstream that speaks both the chat-completions and messages wire
//! formats. Point `OPENAI_BASE_URL` / `ANTHROPIC_BASE_URL` at it.
//!
//! Usage: mock_provider [port] [latency_ms] [error_rate]

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[derive(Clone)]
struct ServerConfig {
    latency_ms: u64,
    error_rate: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let arg = |i: usize, default: &str| args.get(i).cloned().unwrap_or_else(|| default.to_string());
    let port: u16 = arg(1, "3001").parse().context("port")?;
    let latency_ms: u64 = arg(2, "200").parse().context("latency_ms")?;
    let error_rate: f64 = arg(3, "0.0").parse().context("error_rate")?;
    anyhow::ensure!((0.0..=1.0).contains(&error_rate), "error_rate must be within 0..=1");

    let config = ServerConfig { latency_ms, error_rate };

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(messages))
        .with_state(config);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Mock provider on {} (latency {}ms, error rate {})", addr, latency_ms, error_rate);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Sleeps for the configured latency plus jitter, then decides whether this
/// call should fail.
async fn simulate(config: &ServerConfig) -> bool {
    let (jitter, fail) = {
        let mut rng = rand::thread_rng();
        (rng.gen_range(0..=20), config.error_rate > 0.0 && rng.gen_bool(config.error_rate))
    };
    sleep(Duration::from_millis(config.latency_ms + jitter)).await;
    fail
}

fn prompt_of(req: &Value) -> String {
    req["messages"][0]["content"].as_str().unwrap_or_default().to_string()
}

async fn chat_completions(
    State(config): State<ServerConfig>,
    Json(req): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if simulate(&config).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "simulated failure", "type": "server_error"}})),
        );
    }

    let prompt_tokens = (prompt_of(&req).len() / 4).max(1);
    (
        StatusCode::OK,
        Json(json!({
            "id": "mock-response",
            "object": "chat.completion",
            "created": 1677652288,
            "model": req["model"],
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! This is a mock chat completion."
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": 10,
                "total_tokens": prompt_tokens + 10
            }
        })),
    )
}

async fn messages(
    State(config): State<ServerConfig>,
    Json(req): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if simulate(&config).await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "simulated failure"}
            })),
        );
    }

    let input_tokens = (prompt_of(&req).len() / 4).max(1);
    (
        StatusCode::OK,
        Json(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "model": req["model"],
            "content": [{"type": "text", "text": "Hello! This is a mock message."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": input_tokens, "output_tokens": 9}
        })),
    )
}
