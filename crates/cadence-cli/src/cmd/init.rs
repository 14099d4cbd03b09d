use anyhow::Context;
use cadence_core::{io, paths};
use std::path::Path;

/// Starter templates written by `cadence init` when no config exists.
pub const STARTER_CONFIG: &str = "\
version: 1
pipelines:
  - id: ingest
    data_nodes: [raw, cleaned]
  - id: calendar
    data_nodes: [holidays]
    scope: global
scenarios:
  - id: weekly_plan
    pipelines: [ingest, calendar]
    frequency: weekly
    comparators:
      cleaned: [equal, delta]
";

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing cadence in: {}", root.display());

    let dirs = [
        paths::CADENCE_DIR,
        paths::CYCLES_DIR,
        paths::SCENARIOS_DIR,
        paths::PIPELINES_DIR,
        paths::JOBS_DIR,
        paths::DATA_DIR,
    ];
    for dir in dirs {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let written = io::write_if_missing(&paths::config_path(root), STARTER_CONFIG.as_bytes())
        .context("failed to write config.yaml")?;
    if written {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    Ok(())
}
