//! Engine configuration and policy files, both TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory holding the metadata database.
    pub data_dir: PathBuf,
    /// How often the daemon re-reads the cluster snapshot.
    pub evaluate_interval_secs: u64,
    /// Upper bound for a single decider evaluation.
    pub decider_timeout_ms: u64,
    /// Deciders evaluated at the same time, across all policies.
    pub max_concurrent_deciders: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/tierscale"),
            evaluate_interval_secs: 30,
            decider_timeout_ms: 5000,
            max_concurrent_deciders: 16,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.decider_timeout_ms == 0 {
            anyhow::bail!("decider_timeout_ms must be positive");
        }
        if self.max_concurrent_deciders == 0 {
            anyhow::bail!("max_concurrent_deciders must be positive");
        }
        if self.evaluate_interval_secs == 0 {
            anyhow::bail!("evaluate_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn decider_timeout(&self) -> Duration {
        Duration::from_millis(self.decider_timeout_ms)
    }

    pub fn evaluate_interval(&self) -> Duration {
        Duration::from_secs(self.evaluate_interval_secs)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("autoscaling.redb")
    }
}

/// A policy as written by an operator:
///
/// ```toml
/// name = "hot"
///
/// [deciders.manual]
/// kind = "fixed"
/// storage = 107374182400
/// nodes = 3
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    pub name: String,
    #[serde(default)]
    pub deciders: BTreeMap<String, DeciderSpec>,
}

/// One decider entry of a policy file, not yet validated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeciderSpec {
    pub kind: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl PolicyFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
