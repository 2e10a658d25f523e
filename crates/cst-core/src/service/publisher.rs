use async_trait::async_trait;
use tracing::info;

use cst_model::ClusterStatePublicationEvent;

use crate::error::ClusterError;

/// Distributes a newly computed state to the cluster.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &ClusterStatePublicationEvent) -> Result<(), ClusterError>;
}

/// Single-node publisher: accepts every state immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPublisher;

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, event: &ClusterStatePublicationEvent) -> Result<(), ClusterError> {
        info!(
            source = %event.source,
            version = event.state.version,
            previous = event.previous.version,
            "publishing cluster state"
        );
        Ok(())
    }
}
