use crate::model::{BatchSummary, ModelResult};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything a `POST /prompts/test` call returned, kept for later lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub test_id: Uuid,
    pub prompt: String,
    pub prompt_hash: String,
    pub models: Vec<String>,
    pub iterations: u32,
    pub results: Vec<ModelResult>,
    pub summary: BatchSummary,
    pub timestamp: DateTime<Utc>,
}

/// The list view of a record, without per-model payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub test_id: Uuid,
    pub prompt: String,
    pub prompt_hash: String,
    pub models: Vec<String>,
    pub summary: BatchSummary,
    pub timestamp: DateTime<Utc>,
}

impl From<&TestRecord> for HistorySummary {
    fn from(record: &TestRecord) -> Self {
        Self {
            test_id: record.test_id,
            prompt: record.prompt.clone(),
            prompt_hash: record.prompt_hash.clone(),
            models: record.models.clone(),
            summary: record.summary.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// Bounded, TTL-evicting log of recent batches. Write-only from the request
/// path; nothing in dispatch reads it back.
#[derive(Clone)]
pub struct BatchHistory {
    inner: Cache<Uuid, Arc<TestRecord>>,
}

impl BatchHistory {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        // LRU rather than the default TinyLFU: a fresh batch must always be
        // admitted, and the oldest ones are the ones to go.
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { inner }
    }

    pub async fn get(&self, test_id: &Uuid) -> Option<Arc<TestRecord>> {
        self.inner.get(test_id).await
    }

    pub async fn put(&self, record: TestRecord) {
        self.inner.insert(record.test_id, Arc::new(record)).await;
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistorySummary> {
        let mut records: Vec<Arc<TestRecord>> = self.inner.iter().map(|(_, v)| v).collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.iter().take(limit).map(|r| HistorySummary::from(r.as_ref())).collect()
    }
}

/// Stable fingerprint of a trimmed prompt, for grouping repeated runs.
pub fn prompt_hash(prompt: &str) -> String {
    blake3::hash(prompt.trim().as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(prompt: &str, at: DateTime<Utc>) -> TestRecord {
        let results = vec![ModelResult::unsupported("unknown-model", prompt)];
        TestRecord {
            test_id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            prompt_hash: prompt_hash(prompt),
            models: vec!["unknown-model".into()],
            iterations: 1,
            summary: BatchSummary::from_results(&results),
            results,
            timestamp: at,
        }
    }

    #[test]
    fn prompt_hash_ignores_surrounding_whitespace() {
        assert_eq!(prompt_hash("Hello"), prompt_hash("  Hello\n"));
        assert_ne!(prompt_hash("Hello"), prompt_hash("hello"));
        assert_eq!(prompt_hash("Hello").len(), 64);
    }

    #[tokio::test]
    async fn stores_and_fetches_by_id() {
        let history = BatchHistory::new(10, Duration::from_secs(60));
        let rec = record("Hello", Utc::now());
        let id = rec.test_id;
        history.put(rec.clone()).await;

        assert_eq!(history.get(&id).await.as_deref(), Some(&rec));
        assert!(history.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let history = BatchHistory::new(10, Duration::from_secs(60));
        let now = Utc::now();
        for (i, prompt) in ["first", "second", "third"].iter().enumerate() {
            history.put(record(prompt, now + chrono::Duration::seconds(i as i64))).await;
        }

        let recent = history.recent(2);
        let prompts: Vec<&str> = recent.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn full_history_keeps_newest_batches() {
        let history = BatchHistory::new(3, Duration::from_secs(60));
        let now = Utc::now();
        let mut ids = Vec::new();
        for i in 0..10 {
            let rec = record(&format!("p{}", i), now + chrono::Duration::seconds(i));
            ids.push(rec.test_id);
            history.put(rec).await;
            history.inner.run_pending_tasks().await;
        }

        let newest = ids.last().copied().unwrap();
        assert!(history.get(&newest).await.is_some());
        assert!(history.get(&ids[0]).await.is_none());

        let recent = history.recent(3);
        let prompts: Vec<&str> = recent.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["p9", "p8", "p7"]);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let history = BatchHistory::new(10, Duration::from_millis(50));
        let rec = record("Hello", Utc::now());
        let id = rec.test_id;
        history.put(rec).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(history.get(&id).await.is_none());
    }
}
