use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatcher::DispatchMode;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Upstream endpoint and credential for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: String,
    /// `None` switches the adapter to simulated responses.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub dispatch_mode: DispatchMode,
    /// `None` means upstream calls run until they finish on their own.
    pub request_timeout: Option<Duration>,
    pub history_capacity: u64,
    pub history_ttl: Duration,
    pub catalog_path: Option<PathBuf>,
    pub simulated_delay_ms: RangeInclusive<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            openai: ProviderSettings {
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                api_key: None,
            },
            anthropic: ProviderSettings {
                base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
                api_key: None,
            },
            dispatch_mode: DispatchMode::Sequential,
            request_timeout: None,
            history_capacity: 1_000,
            history_ttl: Duration::from_secs(60 * 60),
            catalog_path: None,
            simulated_delay_ms: 500..=2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(addr) = get("ARENA_ADDR") {
            config.addr = addr
                .parse()
                .with_context(|| format!("ARENA_ADDR={} is not a socket address", addr))?;
        }

        config.openai.api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai.base_url = url.trim_end_matches('/').to_string();
        }
        config.anthropic.api_key = get("ANTHROPIC_API_KEY");
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            config.anthropic.base_url = url.trim_end_matches('/').to_string();
        }

        let max_in_flight = match get("ARENA_MAX_IN_FLIGHT") {
            Some(v) => parse_number::<usize>("ARENA_MAX_IN_FLIGHT", &v)?,
            None => num_cpus::get(),
        };
        config.dispatch_mode = match get("ARENA_DISPATCH_MODE").as_deref() {
            None | Some("sequential") => DispatchMode::Sequential,
            Some("concurrent") => DispatchMode::concurrent(max_in_flight),
            Some(other) => bail!(
                "ARENA_DISPATCH_MODE must be `sequential` or `concurrent`, got `{}`",
                other
            ),
        };

        if let Some(v) = get("ARENA_REQUEST_TIMEOUT_SECS") {
            let secs = parse_number::<u64>("ARENA_REQUEST_TIMEOUT_SECS", &v)?;
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = get("ARENA_HISTORY_CAPACITY") {
            config.history_capacity = parse_number("ARENA_HISTORY_CAPACITY", &v)?;
        }
        if let Some(v) = get("ARENA_HISTORY_TTL_SECS") {
            config.history_ttl = Duration::from_secs(parse_number("ARENA_HISTORY_TTL_SECS", &v)?);
        }
        config.catalog_path = get("ARENA_CATALOG_PATH").map(PathBuf::from);
        if let Some(v) = get("ARENA_SIMULATED_DELAY_MS") {
            config.simulated_delay_ms = parse_delay_range(&v)?;
        }

        Ok(config)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("{}={} is not a valid number", key, value))
}

/// Accepts `250` or `100-900`.
fn parse_delay_range(value: &str) -> Result<RangeInclusive<u64>> {
    let (lo, hi) = match value.split_once('-') {
        Some((lo, hi)) => (
            parse_number::<u64>("ARENA_SIMULATED_DELAY_MS", lo.trim())?,
            parse_number::<u64>("ARENA_SIMULATED_DELAY_MS", hi.trim())?,
        ),
        None => {
            let ms = parse_number::<u64>("ARENA_SIMULATED_DELAY_MS", value)?;
            (ms, ms)
        }
    };
    if lo > hi {
        bail!("ARENA_SIMULATED_DELAY_MS range {} is inverted", value);
    }
    Ok(lo..=hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_sequential_without_timeout() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.openai.api_key, None);
        assert_eq!(config.anthropic.base_url, DEFAULT_ANTHROPIC_BASE_URL);
    }

    #[test]
    fn reads_provider_settings_and_modes() {
        let config = config_from(&[
            ("ARENA_ADDR", "0.0.0.0:9000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ANTHROPIC_API_KEY", "  "),
            ("OPENAI_BASE_URL", "http://localhost:3001/"),
            ("ARENA_DISPATCH_MODE", "concurrent"),
            ("ARENA_MAX_IN_FLIGHT", "3"),
            ("ARENA_REQUEST_TIMEOUT_SECS", "30"),
            ("ARENA_SIMULATED_DELAY_MS", "10-20"),
        ])
        .unwrap();

        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.anthropic.api_key, None);
        assert_eq!(config.openai.base_url, "http://localhost:3001");
        assert_eq!(config.dispatch_mode, DispatchMode::concurrent(3));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.simulated_delay_ms, 10..=20);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("ARENA_DISPATCH_MODE", "parallel")]).is_err());
        assert!(config_from(&[("ARENA_HISTORY_CAPACITY", "lots")]).is_err());
        assert!(config_from(&[("ARENA_SIMULATED_DELAY_MS", "900-100")]).is_err());
        assert!(config_from(&[("ARENA_ADDR", "localhost")]).is_err());
    }
}
