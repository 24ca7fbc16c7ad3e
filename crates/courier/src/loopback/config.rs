use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Configuration of a [`LoopbackEngine`](super::LoopbackEngine).
///
/// ```toml
/// workers = 2
///
/// [models."models/slow"]
/// load_delay_ms = 250
///
/// [models."models/broken"]
/// fail_load = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Number of worker threads completing operations.
    pub workers: usize,
    /// Per-locator behaviour. Unlisted locators load and infer instantly.
    pub models: HashMap<String, ModelBehavior>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        LoopbackConfig {
            workers: 4,
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelBehavior {
    pub load_delay_ms: u64,
    pub infer_delay_ms: u64,
    pub fail_load: bool,
    pub fail_infer: bool,
}

impl ModelBehavior {
    pub fn load_delay(&self) -> Duration {
        Duration::from_millis(self.load_delay_ms)
    }

    pub fn infer_delay(&self) -> Duration {
        Duration::from_millis(self.infer_delay_ms)
    }
}

impl LoopbackConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse loopback engine configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_model(mut self, locator: impl Into<String>, behavior: ModelBehavior) -> Self {
        self.models.insert(locator.into(), behavior);
        self
    }

    pub fn behavior(&self, locator: &str) -> ModelBehavior {
        self.models.get(locator).cloned().unwrap_or_default()
    }
}
