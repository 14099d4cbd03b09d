use crate::output::print_json;
use anyhow::Context;
use cadence_core::scenario_manager::ScenarioManager;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum DataSubcommand {
    /// Write a data node value, given as YAML (`42`, `[1, 2]`, `{a: 1}`)
    Write {
        scenario: String,
        data_node: String,
        value: String,
    },
    /// Read a data node value
    Read { scenario: String, data_node: String },
}

pub fn run(root: &Path, subcmd: DataSubcommand, json: bool) -> anyhow::Result<()> {
    let manager = ScenarioManager::open(root).context("failed to open project")?;
    match subcmd {
        DataSubcommand::Write {
            scenario,
            data_node,
            value,
        } => {
            let value: serde_json::Value = serde_yaml::from_str(&value)
                .with_context(|| format!("'{value}' is not a valid YAML value"))?;
            manager
                .write_data(&scenario, &data_node, &value)
                .with_context(|| format!("failed to write '{data_node}' of '{scenario}'"))?;
            if json {
                print_json(&serde_json::json!({ "scenario": scenario, "data_node": data_node, "ok": true }))?;
            } else {
                println!("Wrote {data_node} of {scenario}.");
            }
            Ok(())
        }
        DataSubcommand::Read {
            scenario,
            data_node,
        } => {
            let value = manager.read_data(&scenario, &data_node)?;
            match value {
                Some(v) if json => print_json(&v),
                Some(v) => {
                    print!("{}", serde_yaml::to_string(&v)?);
                    Ok(())
                }
                None if json => print_json(&serde_json::Value::Null),
                None => {
                    println!("(no value)");
                    Ok(())
                }
            }
        }
    }
}
