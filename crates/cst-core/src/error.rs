use thiserror::Error;

use cst_model::ModelError;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no longer master, task rejected")]
    NotMaster,

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("publication failed: {0}")]
    Publish(String),

    #[error("cluster state update failed: {0}")]
    Execution(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("span {0} was never started")]
    UnknownSpan(String),

    #[error("tracer state poisoned")]
    Poisoned,

    #[error("tracer failed: {0}")]
    Failed(String),
}
