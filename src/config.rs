use crate::behavior::FaultPolicy;
use crate::scripting::ScriptLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_hot_reload")]
    pub hot_reload: bool,
    #[serde(default = "ScriptConfig::default_watch_roots")]
    pub watch_roots: Vec<PathBuf>,
    #[serde(default = "ScriptConfig::default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "ScriptConfig::default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "ScriptConfig::default_max_expr_depth")]
    pub max_expr_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub disable_on_fault: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "AssetConfig::default_import_workers")]
    pub import_workers: usize,
    #[serde(default = "AssetConfig::default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scripts: ScriptConfig,
    #[serde(default)]
    pub behaviors: BehaviorConfig,
    #[serde(default)]
    pub assets: AssetConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigOverrides {
    pub hot_reload: Option<bool>,
    pub disable_on_fault: Option<bool>,
}

impl ScriptConfig {
    const fn default_hot_reload() -> bool {
        true
    }

    fn default_watch_roots() -> Vec<PathBuf> {
        vec![PathBuf::from("assets/scripts")]
    }

    const fn default_max_operations() -> u64 {
        500_000
    }

    const fn default_max_call_levels() -> usize {
        64
    }

    const fn default_max_expr_depth() -> usize {
        64
    }

    pub fn limits(&self) -> ScriptLimits {
        ScriptLimits {
            max_operations: self.max_operations,
            max_call_levels: self.max_call_levels,
            max_expr_depth: self.max_expr_depth,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            hot_reload: Self::default_hot_reload(),
            watch_roots: Self::default_watch_roots(),
            max_operations: Self::default_max_operations(),
            max_call_levels: Self::default_max_call_levels(),
            max_expr_depth: Self::default_max_expr_depth(),
        }
    }
}

impl BehaviorConfig {
    pub fn fault_policy(&self) -> FaultPolicy {
        FaultPolicy::from_disable_flag(self.disable_on_fault)
    }
}

impl AssetConfig {
    const fn default_import_workers() -> usize {
        2
    }

    const fn default_queue_depth() -> usize {
        16
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self { import_workers: Self::default_import_workers(), queue_depth: Self::default_queue_depth() }
    }
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RuntimeConfigOverrides) {
        if let Some(hot_reload) = overrides.hot_reload {
            self.scripts.hot_reload = hot_reload;
        }
        if let Some(disable_on_fault) = overrides.disable_on_fault {
            self.behaviors.disable_on_fault = disable_on_fault;
        }
    }
}

impl RuntimeConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.hot_reload.is_none() && self.disable_on_fault.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.hot_reload.is_some() {
            fields.push("hot_reload");
        }
        if self.disable_on_fault.is_some() {
            fields.push("disable_on_fault");
        }
        fields
    }
}
