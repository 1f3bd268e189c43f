use crate::model::ProviderKind;
use anyhow::{bail, Context};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Dollar price per 1k tokens, split by direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

impl Pricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Fallback for ids the classifier routes but the catalog doesn't list.
    pub fn provider_default(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::OpenAI => Pricing::new(0.0015, 0.002),
            ProviderKind::Anthropic => Pricing::new(0.003, 0.015),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Available,
    Beta,
    Deprecated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub max_tokens: u32,
    pub cost_per_1k_tokens: Pricing,
    pub capabilities: Vec<String>,
    pub status: ModelStatus,
}

impl CatalogEntry {
    fn new(
        id: &str,
        name: &str,
        provider: ProviderKind,
        max_tokens: u32,
        pricing: Pricing,
        capabilities: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider,
            max_tokens,
            cost_per_1k_tokens: pricing,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            status: ModelStatus::Available,
        }
    }
}

/// Descriptive metadata for the models the service knows how to reach.
///
/// Routing never consults this list directly: it goes through
/// [`ProviderKind::classify`], and every entry is checked against the same
/// function when the catalog is built, so the two can't disagree.
pub struct ModelCatalog {
    // Swappable so the catalog can be reloaded without restarting.
    entries: ArcSwap<Vec<CatalogEntry>>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> anyhow::Result<Self> {
        validate(&entries)?;
        Ok(Self {
            entries: ArcSwap::from(Arc::new(entries)),
        })
    }

    pub fn builtin() -> Self {
        Self {
            entries: ArcSwap::from(Arc::new(builtin_entries())),
        }
    }

    /// Loads a JSON array of catalog entries.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        Self::new(read_entries(path)?)
    }

    pub fn list_available(&self) -> Arc<Vec<CatalogEntry>> {
        self.entries.load_full()
    }

    /// Price for a model id, falling back to the provider default.
    pub fn pricing(&self, model_id: &str, provider: ProviderKind) -> Pricing {
        self.entries
            .load()
            .iter()
            .find(|e| e.id == model_id)
            .map(|e| e.cost_per_1k_tokens)
            .unwrap_or_else(|| Pricing::provider_default(provider))
    }

    /// Model count per provider name.
    pub fn provider_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.load().iter() {
            *counts.entry(entry.provider.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn replace(&self, entries: Vec<CatalogEntry>) -> anyhow::Result<()> {
        validate(&entries)?;
        self.entries.store(Arc::new(entries));
        Ok(())
    }

    /// Re-reads `path` and swaps it in. On any error the current entries
    /// stay in place. Returns the new entry count.
    pub fn reload_from(&self, path: &Path) -> anyhow::Result<usize> {
        let entries = read_entries(path)?;
        let count = entries.len();
        self.replace(entries)
            .with_context(|| format!("validating model catalog {}", path.display()))?;
        Ok(count)
    }
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<CatalogEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading model catalog {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing model catalog {}", path.display()))
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate(entries: &[CatalogEntry]) -> anyhow::Result<()> {
    let mut seen = std::collections::HashSet::new();
    for entry in entries {
        if !seen.insert(entry.id.as_str()) {
            bail!("duplicate catalog entry {}", entry.id);
        }
        match ProviderKind::classify(&entry.id) {
            Some(kind) if kind == entry.provider => {}
            Some(kind) => bail!(
                "catalog entry {} declares provider {} but routes to {}",
                entry.id,
                entry.provider,
                kind
            ),
            None => bail!("catalog entry {} does not match any provider", entry.id),
        }
        if entry.cost_per_1k_tokens.input < 0.0 || entry.cost_per_1k_tokens.output < 0.0 {
            bail!("catalog entry {} has a negative price", entry.id);
        }
    }
    Ok(())
}

fn builtin_entries() -> Vec<CatalogEntry> {
    use ProviderKind::*;
    vec![
        CatalogEntry::new(
            "gpt-4",
            "GPT-4",
            OpenAI,
            8192,
            Pricing::new(0.03, 0.06),
            &["text", "code", "reasoning"],
        ),
        CatalogEntry::new(
            "gpt-4-turbo",
            "GPT-4 Turbo",
            OpenAI,
            128_000,
            Pricing::new(0.01, 0.03),
            &["text", "code", "reasoning", "vision"],
        ),
        CatalogEntry::new(
            "gpt-3.5-turbo",
            "GPT-3.5 Turbo",
            OpenAI,
            16_385,
            Pricing::new(0.0005, 0.0015),
            &["text", "code"],
        ),
        CatalogEntry::new(
            "claude-3-opus-20240229",
            "Claude 3 Opus",
            Anthropic,
            200_000,
            Pricing::new(0.015, 0.075),
            &["text", "code", "reasoning", "vision"],
        ),
        CatalogEntry::new(
            "claude-3-sonnet-20240229",
            "Claude 3 Sonnet",
            Anthropic,
            200_000,
            Pricing::new(0.003, 0.015),
            &["text", "code", "vision"],
        ),
        CatalogEntry::new(
            "claude-3-haiku-20240307",
            "Claude 3 Haiku",
            Anthropic,
            200_000,
            Pricing::new(0.00025, 0.00125),
            &["text", "code", "vision"],
        ),
    ]
}
