//! Pipelines owned by scenarios, and the manager boundary the scenario
//! manager submits and deletes them through.
//!
//! [`FsPipelineManager`] keeps pipeline and job records on disk. It does not
//! execute anything: a submission only records a [`Job`] and hands it to the
//! bound callbacks.

use crate::config::PipelineConfig;
use crate::data::DataStore;
use crate::error::{CadenceError, Result};
use crate::event::{EntityType, Event, Notifier, Operation};
use crate::job::{Job, JobCallback};
use crate::paths;
use crate::repository::{Record, Repository};
use crate::types::{self, JobStatus, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub config_id: String,
    /// Owning scenario id, or this pipeline's own id when it is shared.
    pub parent_id: String,
    /// Data node config id → data node id.
    #[serde(default)]
    pub data_nodes: BTreeMap<String, String>,
    pub creation_date: DateTime<Utc>,
}

impl Pipeline {
    /// Scenario-scoped pipelines reuse the ids in `known` for data node
    /// configs the scenario already holds. Shared pipelines always get their
    /// own data nodes.
    pub fn new(
        config: &PipelineConfig,
        scenario_id: &str,
        known: &BTreeMap<String, String>,
    ) -> Self {
        let id = types::new_id(types::PIPELINE_PREFIX, &config.id);
        let parent_id = match config.scope {
            Scope::Scenario => scenario_id.to_string(),
            Scope::Global => id.clone(),
        };
        let data_nodes = config
            .data_nodes
            .iter()
            .map(|dn| {
                let id = match (config.scope, known.get(dn)) {
                    (Scope::Scenario, Some(existing)) => existing.clone(),
                    _ => types::new_id(types::DATA_NODE_PREFIX, dn),
                };
                (dn.clone(), id)
            })
            .collect();
        Self {
            id,
            config_id: config.id.clone(),
            parent_id,
            data_nodes,
            creation_date: Utc::now(),
        }
    }

    /// Shared pipelines are their own parent and outlive any one scenario.
    pub fn is_independent(&self) -> bool {
        self.parent_id == self.id
    }

    pub fn is_owned_by(&self, scenario_id: &str) -> bool {
        self.parent_id == scenario_id
    }
}

impl Record for Pipeline {
    const DIR: &'static str = paths::PIPELINES_DIR;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

// ---------------------------------------------------------------------------
// PipelineManager
// ---------------------------------------------------------------------------

pub trait PipelineManager: Send + Sync {
    /// Idempotent per (config, owning scenario). `data_nodes` maps data node
    /// config ids to the ids the scenario already holds.
    fn get_or_create(
        &self,
        config: &PipelineConfig,
        scenario_id: &str,
        data_nodes: &BTreeMap<String, String>,
    ) -> Result<Pipeline>;

    fn get(&self, id: &str) -> Result<Option<Pipeline>>;

    /// Hand `pipeline` to the execution engine. `force` bypasses the
    /// engine's skip logic. Does not wait for execution.
    fn submit(&self, pipeline: &Pipeline, callbacks: &[JobCallback], force: bool) -> Result<Job>;

    fn hard_delete(&self, pipeline_id: &str, scenario_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FsPipelineManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsPipelineManager {
    pipelines: Repository<Pipeline>,
    jobs: Repository<Job>,
    data: DataStore,
    notifier: Notifier,
}

impl FsPipelineManager {
    pub fn new(root: &Path, notifier: Notifier) -> Self {
        Self {
            pipelines: Repository::new(root),
            jobs: Repository::new(root),
            data: DataStore::new(root),
            notifier,
        }
    }

    pub fn get_all(&self) -> Result<Vec<Pipeline>> {
        self.pipelines.get_all()
    }

    pub fn jobs_for(&self, pipeline_id: &str) -> Result<Vec<Job>> {
        self.jobs
            .search_all("pipeline_id", &serde_json::json!(pipeline_id))
    }

    fn find_existing(&self, config: &PipelineConfig, scenario_id: &str) -> Result<Option<Pipeline>> {
        let candidates = self
            .pipelines
            .search_all("config_id", &serde_json::json!(config.id))?;
        Ok(candidates.into_iter().find(|p| match config.scope {
            Scope::Scenario => p.is_owned_by(scenario_id),
            Scope::Global => p.is_independent(),
        }))
    }
}

impl PipelineManager for FsPipelineManager {
    fn get_or_create(
        &self,
        config: &PipelineConfig,
        scenario_id: &str,
        data_nodes: &BTreeMap<String, String>,
    ) -> Result<Pipeline> {
        if let Some(existing) = self.find_existing(config, scenario_id)? {
            return Ok(existing);
        }
        let pipeline = Pipeline::new(config, scenario_id, data_nodes);
        self.pipelines.set(&pipeline)?;
        tracing::debug!(id = %pipeline.id, parent = %pipeline.parent_id, "pipeline created");
        self.notifier
            .publish(Event::new(EntityType::Pipeline, Operation::Creation, &pipeline.id));
        Ok(pipeline)
    }

    fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        self.pipelines.get(id)
    }

    fn submit(&self, pipeline: &Pipeline, callbacks: &[JobCallback], force: bool) -> Result<Job> {
        let cached = !pipeline.data_nodes.is_empty()
            && pipeline.data_nodes.values().all(|id| self.data.has_value(id));
        let status = if cached && !force {
            JobStatus::Skipped
        } else {
            JobStatus::Submitted
        };
        let scenario_id = (!pipeline.is_independent()).then(|| pipeline.parent_id.clone());

        let job = Job::new(&pipeline.config_id, &pipeline.id, scenario_id, status, force);
        self.jobs.set(&job)?;
        tracing::info!(job = %job.id, pipeline = %pipeline.id, status = %status, force, "job created");
        self.notifier
            .publish(Event::new(EntityType::Job, Operation::Creation, &job.id));

        for callback in callbacks {
            callback(&job);
        }
        Ok(job)
    }

    fn hard_delete(&self, pipeline_id: &str, scenario_id: &str) -> Result<()> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)?
            .ok_or_else(|| CadenceError::NonExistingPipeline(pipeline_id.to_string()))?;

        for job in self.jobs_for(pipeline_id)? {
            self.jobs.delete(&job.id)?;
        }
        for data_node_id in pipeline.data_nodes.values() {
            self.data.delete(data_node_id)?;
        }
        self.pipelines.delete(pipeline_id)?;

        tracing::info!(pipeline = pipeline_id, scenario = scenario_id, "pipeline hard-deleted");
        self.notifier
            .publish(Event::new(EntityType::Pipeline, Operation::Deletion, pipeline_id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
