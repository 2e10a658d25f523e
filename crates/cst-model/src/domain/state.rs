use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ClusterName, DiscoveryNodes, PersistentTasks, RoutingTable};

/// Versioned snapshot of cluster membership, routing and metadata.
///
/// A state is never mutated once built; every transition produces a new
/// value through [`ClusterState::builder`]. States are shared as
/// `Arc<ClusterState>` by the applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    pub cluster_name: ClusterName,
    pub version: u64,
    /// Regenerated on every build, so two states with equal content built
    /// separately are still distinguishable.
    pub state_uuid: Uuid,
    pub nodes: DiscoveryNodes,
    pub routing: RoutingTable,
    pub persistent_tasks: PersistentTasks,
}

impl ClusterState {
    /// Version zero state with no members.
    pub fn empty(cluster_name: impl Into<ClusterName>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            version: 0,
            state_uuid: Uuid::new_v4(),
            nodes: DiscoveryNodes::default(),
            routing: RoutingTable::default(),
            persistent_tasks: PersistentTasks::default(),
        }
    }

    /// Builder seeded with a copy of `state`.
    pub fn builder(state: &ClusterState) -> ClusterStateBuilder {
        ClusterStateBuilder {
            cluster_name: state.cluster_name.clone(),
            version: state.version,
            nodes: state.nodes.clone(),
            routing: state.routing.clone(),
            persistent_tasks: state.persistent_tasks.clone(),
        }
    }

    /// Short `[name] version [v] uuid [u]` summary for log lines.
    pub fn summary(&self) -> String {
        format!(
            "cluster [{}] version [{}] uuid [{}]",
            self.cluster_name, self.version, self.state_uuid
        )
    }
}

pub struct ClusterStateBuilder {
    cluster_name: ClusterName,
    version: u64,
    nodes: DiscoveryNodes,
    routing: RoutingTable,
    persistent_tasks: PersistentTasks,
}

impl ClusterStateBuilder {
    pub fn nodes(mut self, nodes: DiscoveryNodes) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    pub fn persistent_tasks(mut self, tasks: PersistentTasks) -> Self {
        self.persistent_tasks = tasks;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn incremented_version(mut self) -> Self {
        self.version += 1;
        self
    }

    pub fn build(self) -> ClusterState {
        ClusterState {
            cluster_name: self.cluster_name,
            version: self.version,
            state_uuid: Uuid::new_v4(),
            nodes: self.nodes,
            routing: self.routing,
            persistent_tasks: self.persistent_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiscoveryNode, NodeId};

    #[test]
    fn builder_keeps_version_and_renews_uuid() {
        let base = ClusterState::empty("prod");
        let next = ClusterState::builder(&base).build();

        assert_eq!(next.version, base.version);
        assert_ne!(next.state_uuid, base.state_uuid);
        assert_eq!(next.cluster_name, "prod");
    }

    #[test]
    fn incremented_version() {
        let base = ClusterState::builder(&ClusterState::empty("prod"))
            .version(41)
            .build();
        assert_eq!(ClusterState::builder(&base).incremented_version().build().version, 42);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let nodes = DiscoveryNodes::builder()
            .add(DiscoveryNode::new(NodeId::new("a").unwrap(), "a", "a:9300"))
            .build();
        let state = ClusterState::builder(&ClusterState::empty("prod"))
            .nodes(nodes)
            .build();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["clusterName"], "prod");
        assert!(json["stateUuid"].is_string());
        assert!(json["persistentTasks"].is_object());
    }
}
