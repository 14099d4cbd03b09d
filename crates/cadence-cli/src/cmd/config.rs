use crate::output::{print_json, print_table};
use anyhow::Context;
use cadence_core::config::{Config, WarnLevel};
use cadence_core::scenario_manager::ScenarioManager;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// List scenario and pipeline templates
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let manager = ScenarioManager::open(root).context("failed to load config")?;
    let config = manager.config();
    let comparators: Vec<&str> = manager.comparators().names().collect();
    let subscribers: Vec<&str> = manager.subscribers().names().collect();

    if json {
        return print_json(&serde_json::json!({
            "config": config,
            "comparators": comparators,
            "subscribers": subscribers,
        }));
    }

    println!("Pipelines:");
    print_table(
        &["ID", "SCOPE", "DATA NODES"],
        config
            .pipelines
            .iter()
            .map(|p| vec![p.id.clone(), p.scope.to_string(), p.data_nodes.join(", ")])
            .collect(),
    );
    println!();
    println!("Scenarios:");
    print_table(
        &["ID", "FREQUENCY", "PIPELINES", "COMPARED"],
        config
            .scenarios
            .iter()
            .map(|s| {
                vec![
                    s.id.clone(),
                    s.frequency.map(|f| f.to_string()).unwrap_or_else(|| "-".into()),
                    s.pipelines.join(", "),
                    s.comparators.keys().cloned().collect::<Vec<_>>().join(", "),
                ]
            })
            .collect(),
    );
    println!();
    println!("Comparators: {}", comparators.join(", "));
    println!("Subscribers: {}", subscribers.join(", "));
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
