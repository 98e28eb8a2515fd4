// src/config.rs
//! File-based configuration with env-var overrides:
//! `config/engine.toml` for the pipeline, `config/ai.json` for the classifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::classify::budget::BudgetedClassifier;
use crate::classify::openai::OpenAiClassifier;
use crate::classify::{DisabledClassifier, DynClassifier, MockClassifier, ThesisCategory};

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_ENGINE_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";

fn default_interval_secs() -> u64 {
    900
}
fn default_store_path() -> String {
    "data/signals.json".to_string()
}
fn default_cache_dir() -> String {
    "cache/classify".to_string()
}

/// Pipeline configuration (`config/engine.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default)]
    pub sources: SourcesConfig,
    pub notion: NotionConfig,
}

/// Which collectors to run. Absent entries disable the source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    pub hn_query: Option<String>,
    #[serde(default)]
    pub reddit_subreddits: Vec<String>,
    pub bevnet_feed: Option<String>,
    pub nosh_feed: Option<String>,
    pub uspto_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    pub database_id: String,
    /// "ENV" means: read from NOTION_API_KEY.
    pub api_key: String,
}

impl EngineConfig {
    /// Load using $ENGINE_CONFIG_PATH, falling back to `config/engine.toml`.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_ENGINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: EngineConfig = toml::from_str(toml_str)?;
        if cfg.notion.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.notion.api_key = env::var("NOTION_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing NOTION_API_KEY env var"))?;
        }
        Ok(cfg)
    }
}

/// Classifier configuration (`config/ai.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (case-insensitive); others fall back to disabled.
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    pub api_key: String,
    /// Per-day real-call budget; defaults to 50 if absent.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_daily_limit() -> u32 {
    50
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: String::new(),
            api_key: String::new(),
            daily_limit: default_daily_limit(),
            model: None,
        }
    }
}

impl AiConfig {
    /// Load from `config/ai.json`. If reading/parsing fails, returns the
    /// disabled default so a missing file never prevents boot.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    fn resolved_api_key(&self) -> String {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

/// Factory: build a classifier according to config and environment.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock.
/// * Else if disabled or unknown provider, returns a disabled classifier
///   (every signal stays retryable until a provider is configured).
/// * Else wraps the real provider with the cache + daily budget.
pub fn build_classifier(config: &AiConfig, cache_dir: &Path) -> DynClassifier {
    if env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false) {
        return Arc::new(MockClassifier::fixed(0.6, ThesisCategory::ConsumerCpg));
    }

    if !config.enabled {
        return Arc::new(DisabledClassifier);
    }

    match config.provider.to_lowercase().as_str() {
        "openai" => {
            let provider =
                OpenAiClassifier::new(config.resolved_api_key(), config.model.as_deref());
            Arc::new(BudgetedClassifier::new(
                provider,
                cache_dir.to_path_buf(),
                config.daily_limit,
            ))
        }
        other => {
            tracing::warn!(provider = other, "unknown classifier provider; disabling");
            Arc::new(DisabledClassifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults_apply() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [notion]
            database_id = "db-1"
            api_key = "secret-inline"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.interval_secs, 900);
        assert_eq!(cfg.store_path, "data/signals.json");
        assert!(cfg.sources.hn_query.is_none());
        assert!(cfg.sources.reddit_subreddits.is_empty());
        assert_eq!(cfg.notion.api_key, "secret-inline");
    }

    #[serial_test::serial]
    #[test]
    fn notion_api_key_env_indirection() {
        env::set_var("NOTION_API_KEY", "from-env");
        let cfg = EngineConfig::from_toml_str(
            r#"
            [notion]
            database_id = "db-1"
            api_key = "ENV"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.notion.api_key, "from-env");
        env::remove_var("NOTION_API_KEY");
    }

    #[test]
    fn ai_config_missing_file_is_disabled_default() {
        let cfg = AiConfig::load_or_default("does/not/exist.json");
        assert!(!cfg.enabled);
        assert_eq!(cfg.daily_limit, 50);
    }

    #[serial_test::serial]
    #[test]
    fn mock_mode_overrides_everything() {
        env::set_var("AI_TEST_MODE", "mock");
        let c = build_classifier(&AiConfig::default(), Path::new("cache/classify"));
        assert_eq!(c.model_name(), "mock");
        env::remove_var("AI_TEST_MODE");
    }
}
