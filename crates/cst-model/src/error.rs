use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("node id must not be empty")]
    EmptyNodeId,
    #[error("unknown node role: {0} (expected: master|data|ingest)")]
    UnknownRole(String),
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
    #[error("node {0} listed twice in membership")]
    DuplicateNode(String),
    #[error("node {0} is not a member")]
    UnknownMember(String),
}
