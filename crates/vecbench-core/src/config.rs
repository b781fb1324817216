//! Harness configuration.
//!
//! Values come from `VECBENCH_*` environment variables (the binary loads a
//! `.env` file first) with command-line flags layered on top by the caller.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingCache, EmbeddingModel, HashingEmbedder, JsonFileStore, OllamaEmbedder};
use crate::error::{HarnessError, Result};
use crate::orchestrator::CleanupPolicy;

/// Which embedding model binding to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Deterministic local feature hashing; no network.
    Hashing,
    /// An Ollama server's `/api/embed`.
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" | "local" => Ok(EmbeddingProvider::Hashing),
            "ollama" => Ok(EmbeddingProvider::Ollama),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown embedding provider '{other}' (expected hashing or ollama)"
            ))),
        }
    }
}

/// Harness-wide settings. Backend connection settings live with the
/// adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Embedding cache file.
    pub cache_path: PathBuf,
    pub embedding_provider: EmbeddingProvider,
    /// Model name passed to the embedding server.
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_endpoint: String,
    /// Per-scenario timeout; 0 disables it.
    pub scenario_timeout_secs: u64,
    pub cleanup: CleanupPolicy,
    pub report_path: PathBuf,
    pub json_report_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(".vecbench/embeddings.json"),
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "all-minilm".to_string(),
            embedding_dimension: 384,
            embedding_endpoint: "http://localhost:11434".to_string(),
            scenario_timeout_secs: 120,
            cleanup: CleanupPolicy::None,
            report_path: PathBuf::from("report.txt"),
            json_report_path: None,
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by any `VECBENCH_*` variable that is set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("VECBENCH_CACHE_PATH") {
            cfg.cache_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VECBENCH_EMBEDDING_PROVIDER") {
            cfg.embedding_provider = v.parse()?;
        }
        if let Some(v) = lookup("VECBENCH_EMBEDDING_MODEL") {
            cfg.embedding_model = v;
        }
        if let Some(v) = lookup("VECBENCH_EMBEDDING_DIMENSION") {
            cfg.embedding_dimension = parse_number("VECBENCH_EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("VECBENCH_EMBEDDING_ENDPOINT") {
            cfg.embedding_endpoint = v;
        }
        if let Some(v) = lookup("VECBENCH_SCENARIO_TIMEOUT_SECS") {
            cfg.scenario_timeout_secs = parse_number("VECBENCH_SCENARIO_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("VECBENCH_CLEANUP") {
            cfg.cleanup = v.parse()?;
        }
        if let Some(v) = lookup("VECBENCH_REPORT_PATH") {
            cfg.report_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VECBENCH_JSON_REPORT_PATH") {
            cfg.json_report_path = Some(PathBuf::from(v));
        }
        if cfg.embedding_dimension == 0 {
            return Err(HarnessError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(cfg)
    }

    pub fn scenario_timeout(&self) -> Option<Duration> {
        (self.scenario_timeout_secs > 0).then(|| Duration::from_secs(self.scenario_timeout_secs))
    }

    /// Build the configured model binding.
    pub fn embedding_model(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model: Arc<dyn EmbeddingModel> = match self.embedding_provider {
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(self.embedding_dimension)),
            EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
                &self.embedding_endpoint,
                &self.embedding_model,
                self.embedding_dimension,
                Duration::from_secs(60),
            )?),
        };
        Ok(model)
    }

    /// Build the embedding cache over the configured model and cache file.
    pub fn embedding_cache(&self) -> Result<EmbeddingCache> {
        Ok(EmbeddingCache::new(
            self.embedding_model()?,
            Arc::new(JsonFileStore::new(&self.cache_path)),
        ))
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::InvalidConfig(format!("{key}: '{value}' is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = HarnessConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.embedding_dimension, 384);
        assert_eq!(cfg.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(cfg.scenario_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(cfg.cleanup, CleanupPolicy::None);
    }

    #[test]
    fn env_overrides_are_applied() {
        let cfg = HarnessConfig::from_lookup(lookup(&[
            ("VECBENCH_EMBEDDING_PROVIDER", "ollama"),
            ("VECBENCH_EMBEDDING_DIMENSION", "768"),
            ("VECBENCH_SCENARIO_TIMEOUT_SECS", "0"),
            ("VECBENCH_CLEANUP", "always"),
        ]))
        .unwrap();
        assert_eq!(cfg.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(cfg.embedding_dimension, 768);
        assert_eq!(cfg.scenario_timeout(), None);
        assert_eq!(cfg.cleanup, CleanupPolicy::AlwaysCleanup);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(HarnessConfig::from_lookup(lookup(&[("VECBENCH_EMBEDDING_DIMENSION", "lots")])).is_err());
        assert!(HarnessConfig::from_lookup(lookup(&[("VECBENCH_EMBEDDING_DIMENSION", "0")])).is_err());
        assert!(HarnessConfig::from_lookup(lookup(&[("VECBENCH_EMBEDDING_PROVIDER", "magic")])).is_err());
    }
}
