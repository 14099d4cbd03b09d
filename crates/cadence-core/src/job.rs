use crate::paths;
use crate::repository::Record;
use crate::types::{self, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one pipeline submission handed to the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub pipeline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    pub status: JobStatus,
    pub force: bool,
    pub creation_date: DateTime<Utc>,
}

impl Job {
    pub fn new(
        pipeline_config_id: &str,
        pipeline_id: impl Into<String>,
        scenario_id: Option<String>,
        status: JobStatus,
        force: bool,
    ) -> Self {
        Self {
            id: types::new_id(types::JOB_PREFIX, pipeline_config_id),
            pipeline_id: pipeline_id.into(),
            scenario_id,
            status,
            force,
            creation_date: Utc::now(),
        }
    }
}

impl Record for Job {
    const DIR: &'static str = paths::JOBS_DIR;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.creation_date
    }
}

/// Callback invoked with each job a submission creates.
pub type JobCallback = Box<dyn Fn(&Job) + Send + Sync>;
