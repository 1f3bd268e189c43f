//! Load driver: fires concurrent comparison requests at a running server.
//!
//! Usage: simulator [base_url] [requests]

use anyhow::Context;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

const MODELS: [&str; 4] = ["gpt-4", "gpt-3.5-turbo", "claude-3-haiku-20240307", "unknown-model"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let base_url = args.get(1).cloned().unwrap_or_else(|| "http://localhost:8080".to_string());
    let total: usize = args
        .get(2)
        .map(|s| s.parse::<usize>())
        .transpose()
        .context("requests")?
        .unwrap_or(50);

    println!("Sending {} comparison requests to {}...", total, base_url);

    let client = reqwest::Client::new();
    let ok = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let failed_models = Arc::new(AtomicUsize::new(0));
    let start_time = Instant::now();

    let mut tasks = JoinSet::new();
    for i in 0..total {
        let client = client.clone();
        let ok = ok.clone();
        let errors = errors.clone();
        let failed_models = failed_models.clone();
        let url = format!("{}/prompts/test", base_url);

        tasks.spawn(async move {
            let body = serde_json::json!({
                "prompt": format!("Summarize request {} in one sentence.", i),
                "models": MODELS,
                "temperature": 0.7,
                "maxTokens": 128
            });

            let resp = match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => resp,
                _ => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            };
            match resp.json::<serde_json::Value>().await {
                Ok(value) => {
                    ok.fetch_add(1, Ordering::Relaxed);
                    let failed = value["summary"]["failedModels"].as_u64().unwrap_or(0) as usize;
                    failed_models.fetch_add(failed, Ordering::Relaxed);
                }
                Err(_) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    while tasks.join_next().await.is_some() {}

    let duration = start_time.elapsed();
    println!("--- Results ---");
    println!("Requests: {}", total);
    println!("Success: {}", ok.load(Ordering::Relaxed));
    println!("Errors: {}", errors.load(Ordering::Relaxed));
    println!("Failed model entries: {}", failed_models.load(Ordering::Relaxed));
    println!("Total Time: {:?}", duration);
    println!("RPS: {:.2}", total as f64 / duration.as_secs_f64());
    Ok(())
}
