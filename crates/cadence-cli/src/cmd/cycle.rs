use super::parse_instant;
use crate::output::{print_fields, print_json, print_table};
use anyhow::Context;
use cadence_core::cycle::Cycle;
use cadence_core::scenario_manager::ScenarioManager;
use cadence_core::types::Frequency;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum CycleSubcommand {
    /// Return the cycle covering an instant, creating it if needed
    GetOrCreate {
        /// daily, weekly, monthly or yearly
        #[arg(long)]
        frequency: Frequency,
        /// Instant inside the cycle (RFC 3339 or YYYY-MM-DD, default now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,
        /// Display name for a newly created cycle
        #[arg(long)]
        name: Option<String>,
    },
    /// List cycles
    List {
        #[arg(long)]
        frequency: Option<Frequency>,
    },
    /// Show one cycle
    Show { id: String },
}

pub fn run(root: &Path, subcmd: CycleSubcommand, json: bool) -> anyhow::Result<()> {
    let manager = ScenarioManager::open(root).context("failed to open project")?;
    match subcmd {
        CycleSubcommand::GetOrCreate {
            frequency,
            at,
            name,
        } => {
            let cycle = manager
                .cycles()
                .get_or_create(frequency, at, name.as_deref())
                .context("failed to get or create cycle")?;
            show_cycle(&cycle, json)
        }
        CycleSubcommand::List { frequency } => list(&manager, frequency, json),
        CycleSubcommand::Show { id } => {
            let cycle = manager.cycles().get(&id)?;
            show_cycle(&cycle, json)
        }
    }
}

fn list(manager: &ScenarioManager, frequency: Option<Frequency>, json: bool) -> anyhow::Result<()> {
    let cycles = match frequency {
        Some(f) => manager.cycles().get_all_by_frequency(f)?,
        None => manager.cycles().get_all()?,
    };

    if json {
        return print_json(&cycles);
    }
    print_table(
        &["ID", "FREQUENCY", "START", "END", "NAME"],
        cycles
            .iter()
            .map(|c| {
                vec![
                    c.id.clone(),
                    c.frequency.to_string(),
                    timestamp(c.start_date),
                    timestamp(c.end_date),
                    c.display_name().to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn show_cycle(cycle: &Cycle, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(cycle);
    }
    print_fields(&[
        ("id", cycle.id.clone()),
        ("name", cycle.display_name().to_string()),
        ("frequency", cycle.frequency.to_string()),
        ("start", timestamp(cycle.start_date)),
        ("end", timestamp(cycle.end_date)),
        ("created", timestamp(cycle.creation_date)),
    ]);
    Ok(())
}

pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
