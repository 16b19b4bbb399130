use std::collections::HashMap;
use std::sync::RwLock;

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};

/// One credentialed route to a provider, ranked by `priority` and subject to
/// model and user-group filters (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub allowed_models: Option<Vec<String>>,
    #[serde(default)]
    pub model_costs: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub allowed_user_groups: Option<Vec<String>>,
}

fn default_priority() -> i32 {
    100
}

/// `loadBalancing.strategy` — the tie-break strategy among equal-priority
/// eligible profiles. Default is `random` when unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    First,
    #[default]
    Random,
    RoundRobin,
    LeastUsed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingConfig {
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
}

/// Top-level engine configuration (§6.5): a single JSON document, optionally
/// overridden by `BRAID_`-prefixed environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BraidConfig {
    #[serde(default)]
    pub providers: HashMap<String, Vec<ProviderProfile>>,
    #[serde(default)]
    pub default_profiles: HashMap<String, String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub features: HashMap<String, bool>,
    #[serde(default)]
    pub load_balancing: LoadBalancingConfig,
    #[serde(default)]
    pub currencies: Vec<String>,
}

impl BraidConfig {
    /// Load from a JSON file with `BRAID_`-prefixed environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let config: BraidConfig = Figment::new()
            .merge(Json::file(path))
            .merge(Env::prefixed("BRAID_").split("__"))
            .extract()
            .map_err(|e| BraidError::Internal(format!("config load failed: {e}")))?;
        Ok(config)
    }

    /// Flatten all configured profiles across provider types, in file order.
    pub fn all_profiles(&self) -> Vec<&ProviderProfile> {
        self.providers.values().flatten().collect()
    }
}

/// One entry of `models.json`: display metadata and settings ranges for a
/// model known to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub context_window: Option<u64>,
    #[serde(default)]
    pub legacy_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelsConfig {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl ModelsConfig {
    pub fn load(path: &str) -> Result<Self> {
        let config: ModelsConfig = Figment::new()
            .merge(Json::file(path))
            .extract()
            .map_err(|e| BraidError::Internal(format!("models config load failed: {e}")))?;
        Ok(config)
    }

    /// Resolve a legacy model ID to its current upstream ID, if mapped.
    pub fn resolve(&self, model_id: &str) -> String {
        for model in &self.models {
            if model.id == model_id || model.legacy_ids.iter().any(|l| l == model_id) {
                return model.id.clone();
            }
        }
        model_id.to_string()
    }
}

/// Hot-reloadable handle over both config files (§6.5: "both files are
/// hot-reloadable via an explicit reload operation").
///
/// Reload re-parses from disk and atomically swaps the in-memory value under
/// a `RwLock`; in-flight readers holding a snapshot are unaffected.
pub struct ConfigHandle {
    config_path: String,
    models_path: String,
    config: RwLock<BraidConfig>,
    models: RwLock<ModelsConfig>,
}

impl ConfigHandle {
    pub fn load(config_path: impl Into<String>, models_path: impl Into<String>) -> Result<Self> {
        let config_path = config_path.into();
        let models_path = models_path.into();
        let config = BraidConfig::load(&config_path)?;
        let models = ModelsConfig::load(&models_path)?;
        Ok(Self {
            config_path,
            models_path,
            config: RwLock::new(config),
            models: RwLock::new(models),
        })
    }

    pub fn config(&self) -> BraidConfig {
        self.config.read().unwrap().clone()
    }

    pub fn models(&self) -> ModelsConfig {
        self.models.read().unwrap().clone()
    }

    /// Re-read both files from disk and swap them in. On parse failure the
    /// previously loaded configuration is retained.
    pub fn reload(&self) -> Result<()> {
        let new_config = BraidConfig::load(&self.config_path)?;
        let new_models = ModelsConfig::load(&self.models_path)?;
        *self.config.write().unwrap() = new_config;
        *self.models.write().unwrap() = new_models;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path.to_string_lossy().to_string())
    }

    #[test]
    fn loads_profiles_and_defaults_strategy_to_random() {
        let (_dir, path) = write_temp(
            r#"{"providers": {"anthropic": [{"id": "p-a", "priority": 1}]}}"#,
        );
        let cfg = BraidConfig::load(&path).unwrap();
        assert_eq!(cfg.load_balancing.strategy, LoadBalancingStrategy::Random);
        assert_eq!(cfg.all_profiles().len(), 1);
        assert_eq!(cfg.all_profiles()[0].id, "p-a");
    }

    #[test]
    fn reload_picks_up_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        let models_path = dir.path().join("models.json");
        std::fs::write(&cfg_path, r#"{"defaultModel": "a"}"#).unwrap();
        std::fs::write(&models_path, r#"{"models": []}"#).unwrap();

        let handle = ConfigHandle::load(
            cfg_path.to_string_lossy().to_string(),
            models_path.to_string_lossy().to_string(),
        )
        .unwrap();
        assert_eq!(handle.config().default_model.as_deref(), Some("a"));

        std::fs::write(&cfg_path, r#"{"defaultModel": "b"}"#).unwrap();
        handle.reload().unwrap();
        assert_eq!(handle.config().default_model.as_deref(), Some("b"));
    }

    #[test]
    fn models_resolve_falls_back_to_legacy_id_mapping() {
        let (_dir, path) = write_temp(
            r#"{"models": [{"id": "claude3opus", "legacyIds": ["opus"]}]}"#,
        );
        let models = ModelsConfig::load(&path).unwrap();
        assert_eq!(models.resolve("opus"), "claude3opus");
        assert_eq!(models.resolve("unknown"), "unknown");
    }
}
