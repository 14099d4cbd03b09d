use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("not initialized: run 'cadence init'")]
    NotInitialized,

    #[error("scenario not found: {0}")]
    NonExistingScenario(String),

    #[error("scenario config not found: {0}")]
    NonExistingScenarioConfig(String),

    #[error("pipeline config not found: {0}")]
    NonExistingPipelineConfig(String),

    #[error("no comparator registered for data node '{0}'")]
    NonExistingComparator(String),

    #[error("comparator function '{0}' is not registered")]
    UnknownComparatorFunction(String),

    #[error("subscriber '{0}' is not registered")]
    UnknownSubscriber(String),

    #[error("cycle not found: {0}")]
    NonExistingCycle(String),

    #[error("pipeline not found: {0}")]
    NonExistingPipeline(String),

    #[error("scenario '{scenario}' has no data node '{data_node}'")]
    NonExistingDataNode { scenario: String, data_node: String },

    #[error("scenario '{0}' does not belong to a cycle")]
    DoesNotBelongToACycle(String),

    #[error("scenario '{0}' is the master of its cycle and cannot be deleted")]
    DeletingMasterScenario(String),

    #[error("scenarios to compare must share the same config")]
    DifferentScenarioConfigs,

    #[error("at least two scenarios are required for a comparison")]
    InsufficientScenarioToCompare,

    #[error("tag '{tag}' is not authorized by scenario config '{config_id}'")]
    UnauthorizedTag { tag: String, config_id: String },

    #[error("invalid frequency '{0}': expected daily, weekly, monthly or yearly")]
    InvalidFrequency(String),

    #[error("invalid config id '{0}': must start with a letter and contain only letters, digits and underscores")]
    InvalidConfigId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CadenceError>;
