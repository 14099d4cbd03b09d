use super::cycle::timestamp;
use super::parse_instant;
use crate::output::{print_fields, print_json, print_table};
use anyhow::Context;
use cadence_core::scenario::Scenario;
use cadence_core::scenario_manager::ScenarioManager;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ScenarioSubcommand {
    /// Instantiate a scenario template
    Create {
        config_id: String,
        /// Creation instant (RFC 3339 or YYYY-MM-DD, default now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// List scenarios, optionally filtered
    List {
        #[arg(long)]
        cycle: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Only masters
        #[arg(long)]
        masters: bool,
        /// Only instances of this template
        #[arg(long = "config")]
        config_id: Option<String>,
    },
    /// Show one scenario
    Show { id: String },
    /// Show the master scenario of a cycle
    Master { cycle: String },
    /// Show the scenario holding TAG in CYCLE
    ByTag { cycle: String, tag: String },
    /// Submit every pipeline of a scenario
    Submit {
        id: String,
        /// Re-run pipelines whose outputs are already present
        #[arg(long)]
        force: bool,
    },
    /// Tag a scenario, moving the tag off any other scenario of its cycle
    Tag { id: String, tag: String },
    /// Remove a tag
    Untag { id: String, tag: String },
    /// Make a scenario the master of its cycle
    SetMaster { id: String },
    /// Delete a scenario (never the master)
    Delete {
        id: String,
        /// Also delete the pipelines, jobs and data the scenario owns
        #[arg(long)]
        hard: bool,
    },
    /// Run the template's comparators across scenarios
    Compare {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
        /// Limit to one data node
        #[arg(long)]
        data_node: Option<String>,
    },
    /// Add a registered subscriber to one scenario or all of them
    Subscribe {
        name: String,
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Remove a subscriber from one scenario or all of them
    Unsubscribe {
        name: String,
        #[arg(long)]
        scenario: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ScenarioSubcommand, json: bool) -> anyhow::Result<()> {
    let manager = ScenarioManager::open(root).context("failed to open project")?;
    match subcmd {
        ScenarioSubcommand::Create {
            config_id,
            at,
            name,
        } => {
            let scenario = manager
                .create_from_config_id(&config_id, at, name.as_deref())
                .with_context(|| format!("failed to create scenario from '{config_id}'"))?;
            show_scenario(&scenario, json)
        }
        ScenarioSubcommand::List {
            cycle,
            tag,
            masters,
            config_id,
        } => list(
            &manager,
            cycle.as_deref(),
            tag.as_deref(),
            masters,
            config_id.as_deref(),
            json,
        ),
        ScenarioSubcommand::Show { id } => show_scenario(&manager.get(&id)?, json),
        ScenarioSubcommand::Master { cycle } => {
            let master = manager.get_master(&cycle)?;
            show_optional(master.as_ref(), &format!("no master in cycle '{cycle}'"), json)
        }
        ScenarioSubcommand::ByTag { cycle, tag } => {
            let holder = manager.get_by_tag(&cycle, &tag)?;
            show_optional(
                holder.as_ref(),
                &format!("no scenario tagged '{tag}' in cycle '{cycle}'"),
                json,
            )
        }
        ScenarioSubcommand::Submit { id, force } => submit(&manager, &id, force, json),
        ScenarioSubcommand::Tag { id, tag } => {
            let scenario = manager
                .tag(&id, &tag)
                .with_context(|| format!("failed to tag '{id}'"))?;
            done(json, &scenario.id, &format!("Tagged {} with '{tag}'.", scenario.id))
        }
        ScenarioSubcommand::Untag { id, tag } => {
            let scenario = manager.untag(&id, &tag)?;
            done(json, &scenario.id, &format!("Removed tag '{tag}' from {}.", scenario.id))
        }
        ScenarioSubcommand::SetMaster { id } => {
            let scenario = manager
                .set_master(&id)
                .with_context(|| format!("failed to set '{id}' as master"))?;
            done(json, &scenario.id, &format!("{} is now master.", scenario.id))
        }
        ScenarioSubcommand::Delete { id, hard } => {
            let deleted = if hard {
                manager.hard_delete(&id)
            } else {
                manager.delete(&id)
            };
            deleted.with_context(|| format!("failed to delete '{id}'"))?;
            done(json, &id, &format!("Deleted {id}."))
        }
        ScenarioSubcommand::Compare { ids, data_node } => {
            compare(&manager, &ids, data_node.as_deref(), json)
        }
        ScenarioSubcommand::Subscribe { name, scenario } => {
            manager.subscribe(&name, scenario.as_deref())?;
            done(json, scenario.as_deref().unwrap_or("*"), &format!("Subscribed '{name}'."))
        }
        ScenarioSubcommand::Unsubscribe { name, scenario } => {
            manager.unsubscribe(&name, scenario.as_deref())?;
            done(json, scenario.as_deref().unwrap_or("*"), &format!("Unsubscribed '{name}'."))
        }
    }
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(
    manager: &ScenarioManager,
    cycle: Option<&str>,
    tag: Option<&str>,
    masters: bool,
    config_id: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut scenarios = match cycle {
        Some(c) => manager.get_all_by_cycle(c)?,
        None => manager.get_all()?,
    };
    scenarios.retain(|s| {
        tag.map_or(true, |t| s.has_tag(t))
            && (!masters || s.is_master)
            && config_id.map_or(true, |c| s.config_id == c)
    });

    if json {
        return print_json(&scenarios);
    }
    print_table(
        &["ID", "CONFIG", "CYCLE", "MASTER", "TAGS", "CREATED"],
        scenarios
            .iter()
            .map(|s| {
                vec![
                    s.id.clone(),
                    s.config_id.clone(),
                    s.cycle.clone().unwrap_or_else(|| "-".into()),
                    if s.is_master { "yes".into() } else { "".into() },
                    tags(s),
                    timestamp(s.creation_date),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn show_scenario(scenario: &Scenario, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(scenario);
    }
    print_fields(&[
        ("id", scenario.id.clone()),
        ("name", scenario.display_name().unwrap_or("-").to_string()),
        ("config", scenario.config_id.clone()),
        ("cycle", scenario.cycle.clone().unwrap_or_else(|| "-".into())),
        ("master", scenario.is_master.to_string()),
        ("tags", tags(scenario)),
        ("subscribers", scenario.subscribers.join(", ")),
        ("created", timestamp(scenario.creation_date)),
    ]);
    println!();
    print_table(
        &["PIPELINE", "ID"],
        scenario
            .pipelines
            .iter()
            .map(|(k, v)| vec![k.clone(), v.clone()])
            .collect(),
    );
    println!();
    print_table(
        &["DATA NODE", "ID"],
        scenario
            .data_nodes
            .iter()
            .map(|(k, v)| vec![k.clone(), v.clone()])
            .collect(),
    );
    Ok(())
}

fn show_optional(scenario: Option<&Scenario>, missing: &str, json: bool) -> anyhow::Result<()> {
    match scenario {
        Some(s) => show_scenario(s, json),
        None if json => print_json(&serde_json::Value::Null),
        None => {
            println!("{missing}");
            Ok(())
        }
    }
}

fn tags(scenario: &Scenario) -> String {
    scenario.tags.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn done(json: bool, id: &str, message: &str) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({ "id": id, "ok": true }))
    } else {
        println!("{message}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// submit / compare
// ---------------------------------------------------------------------------

fn submit(manager: &ScenarioManager, id: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let jobs = manager
        .submit(id, force)
        .with_context(|| format!("failed to submit '{id}'"))?;

    if json {
        return print_json(&jobs);
    }
    print_table(
        &["JOB", "PIPELINE", "STATUS"],
        jobs.iter()
            .map(|j| vec![j.id.clone(), j.pipeline_id.clone(), j.status.to_string()])
            .collect(),
    );
    Ok(())
}

fn compare(
    manager: &ScenarioManager,
    ids: &[String],
    data_node: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let results = manager
        .compare(ids, data_node)
        .context("comparison failed")?;

    if json {
        return print_json(&results);
    }
    let mut rows = Vec::new();
    for (dn, outputs) in &results {
        for (comparator, value) in outputs {
            rows.push(vec![dn.clone(), comparator.clone(), value.to_string()]);
        }
    }
    print_table(&["DATA NODE", "COMPARATOR", "RESULT"], rows);
    Ok(())
}
