use crate::error::{CadenceError, Result};
use crate::paths;
use crate::types::{Frequency, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: String,
    /// Config ids of the data nodes this pipeline produces.
    #[serde(default)]
    pub data_nodes: Vec<String>,
    #[serde(default)]
    pub scope: Scope,
}

impl PipelineConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_nodes: Vec::new(),
            scope: Scope::Scenario,
        }
    }
}

// ---------------------------------------------------------------------------
// ScenarioConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub id: String,
    /// Pipeline config ids, resolved through [`Config::pipeline_configs`].
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Data node config id → comparator names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comparators: BTreeMap<String, Vec<String>>,
}

impl ScenarioConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipelines: Vec::new(),
            frequency: None,
            properties: BTreeMap::new(),
            comparators: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            pipelines: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CadenceError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        let ids = cfg
            .pipelines
            .iter()
            .map(|p| &p.id)
            .chain(cfg.scenarios.iter().map(|s| &s.id));
        for id in ids {
            paths::validate_config_id(id)?;
        }
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn scenario(&self, id: &str) -> Result<&ScenarioConfig> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| CadenceError::NonExistingScenarioConfig(id.to_string()))
    }

    pub fn pipeline(&self, id: &str) -> Result<&PipelineConfig> {
        self.pipelines
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| CadenceError::NonExistingPipelineConfig(id.to_string()))
    }

    /// The pipeline templates of `scenario`, in declaration order.
    pub fn pipeline_configs(&self, scenario: &ScenarioConfig) -> Result<Vec<&PipelineConfig>> {
        scenario
            .pipelines
            .iter()
            .map(|id| self.pipeline(id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        // 1. Ids must be valid and unique per section
        let mut seen = HashSet::new();
        for p in &self.pipelines {
            if paths::validate_config_id(&p.id).is_err() {
                warnings.push(error(format!("invalid pipeline config id '{}'", p.id)));
            }
            if !seen.insert(p.id.as_str()) {
                warnings.push(error(format!("duplicate pipeline config id '{}'", p.id)));
            }
            for dn in &p.data_nodes {
                if paths::validate_config_id(dn).is_err() {
                    warnings.push(error(format!(
                        "invalid data node config id '{}' in pipeline '{}'",
                        dn, p.id
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for s in &self.scenarios {
            if paths::validate_config_id(&s.id).is_err() {
                warnings.push(error(format!("invalid scenario config id '{}'", s.id)));
            }
            if !seen.insert(s.id.as_str()) {
                warnings.push(error(format!("duplicate scenario config id '{}'", s.id)));
            }

            // 2. Pipeline references must resolve
            let mut produced = HashSet::new();
            let mut shared = HashSet::new();
            let mut owned = HashSet::new();
            for pid in &s.pipelines {
                match self.pipeline(pid) {
                    Ok(p) => {
                        produced.extend(p.data_nodes.iter().map(String::as_str));
                        let bucket = match p.scope {
                            Scope::Scenario => &mut owned,
                            Scope::Global => &mut shared,
                        };
                        bucket.extend(p.data_nodes.iter().map(String::as_str));
                    }
                    Err(_) => warnings.push(error(format!(
                        "scenario '{}' references unknown pipeline '{}'",
                        s.id, pid
                    ))),
                }
            }

            // Scenario pipelines cannot share a data node with a global one
            let mut mixed: Vec<&str> = owned.intersection(&shared).copied().collect();
            mixed.sort_unstable();
            for dn in mixed {
                warnings.push(warning(format!(
                    "scenario '{}' has data node '{}' in both a global and a scenario pipeline; they will not share it",
                    s.id, dn
                )));
            }

            // 3. Comparators should target produced data nodes
            for (dn, names) in &s.comparators {
                if !produced.contains(dn.as_str()) {
                    warnings.push(warning(format!(
                        "scenario '{}' has comparators for data node '{}' which none of its pipelines produce",
                        s.id, dn
                    )));
                }
                if names.is_empty() {
                    warnings.push(warning(format!(
                        "scenario '{}' lists no comparators for data node '{}'",
                        s.id, dn
                    )));
                }
            }

            // 4. authorized_tags must be a list of strings
            if let Some(tags) = s.properties.get(crate::scenario::AUTHORIZED_TAGS_KEY) {
                let ok = tags
                    .as_array()
                    .map(|a| a.iter().all(|t| t.is_string()))
                    .unwrap_or(false);
                if !ok {
                    warnings.push(error(format!(
                        "scenario '{}' has an authorized_tags property that is not a list of strings",
                        s.id
                    )));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
