use crate::error::{CadenceError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CADENCE_DIR: &str = ".cadence";
pub const CYCLES_DIR: &str = ".cadence/cycles";
pub const SCENARIOS_DIR: &str = ".cadence/scenarios";
pub const PIPELINES_DIR: &str = ".cadence/pipelines";
pub const JOBS_DIR: &str = ".cadence/jobs";
pub const DATA_DIR: &str = ".cadence/data";

pub const CONFIG_FILE: &str = ".cadence/config.yaml";
pub const RECORD_EXT: &str = "yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Path of the record `id` inside the entity directory `dir`.
pub fn record_path(root: &Path, dir: &str, id: &str) -> PathBuf {
    root.join(dir).join(format!("{id}.{RECORD_EXT}"))
}

pub fn data_path(root: &Path, data_node_id: &str) -> PathBuf {
    record_path(root, DATA_DIR, data_node_id)
}

// ---------------------------------------------------------------------------
// Config id validation
// ---------------------------------------------------------------------------

static CONFIG_ID_RE: OnceLock<Regex> = OnceLock::new();

fn config_id_re() -> &'static Regex {
    CONFIG_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap())
}

pub fn validate_config_id(id: &str) -> Result<()> {
    if id.len() > 64 || !config_id_re().is_match(id) {
        return Err(CadenceError::InvalidConfigId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
