use std::{sync::Arc, time::Duration};

use crate::{ClusterState, NodesDelta};

/// Emitted after a new state has been published.
#[derive(Debug, Clone)]
pub struct ClusterStatePublicationEvent {
    /// Description of the batch that produced the new state.
    pub source: String,
    pub previous: Arc<ClusterState>,
    pub state: Arc<ClusterState>,
    /// Time spent computing the new state.
    pub compute_duration: Duration,
    /// Time spent publishing it.
    pub publication_duration: Duration,
}

impl ClusterStatePublicationEvent {
    pub fn new(source: impl Into<String>, previous: Arc<ClusterState>, state: Arc<ClusterState>) -> Self {
        Self {
            source: source.into(),
            previous,
            state,
            compute_duration: Duration::ZERO,
            publication_duration: Duration::ZERO,
        }
    }

    pub fn nodes_delta(&self) -> NodesDelta {
        self.state.nodes.delta(&self.previous.nodes)
    }

    pub fn nodes_removed(&self) -> bool {
        !self.nodes_delta().removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiscoveryNode, DiscoveryNodes, NodeId};

    fn state_with(ids: &[&str]) -> Arc<ClusterState> {
        let mut nodes = DiscoveryNodes::builder();
        for id in ids {
            nodes.put(DiscoveryNode::new(NodeId::new(*id).unwrap(), *id, format!("{id}:9300")));
        }
        Arc::new(
            ClusterState::builder(&ClusterState::empty("events"))
                .nodes(nodes.build())
                .build(),
        )
    }

    #[test]
    fn reports_removed_nodes() {
        let event = ClusterStatePublicationEvent::new("node-left", state_with(&["a", "b"]), state_with(&["a"]));
        assert!(event.nodes_removed());
        assert_eq!(event.nodes_delta().removed, vec![NodeId::new("b").unwrap()]);
    }

    #[test]
    fn additions_alone_are_not_removals() {
        let event = ClusterStatePublicationEvent::new("node-join", state_with(&["a"]), state_with(&["a", "b"]));
        assert!(!event.nodes_removed());
        assert!(event.nodes_delta().has_changes());
    }
}
