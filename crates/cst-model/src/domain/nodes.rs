use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DiscoveryNode, ModelError, NodeId};

/// Cluster membership at a point in time.
///
/// Serialized as a node list; the master and local ids must name members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NodesRepr", into = "NodesRepr")]
pub struct DiscoveryNodes {
    nodes: BTreeMap<NodeId, DiscoveryNode>,
    master_node_id: Option<NodeId>,
    local_node_id: Option<NodeId>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodesRepr {
    nodes: Vec<DiscoveryNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    master_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_node_id: Option<NodeId>,
}

impl TryFrom<NodesRepr> for DiscoveryNodes {
    type Error = ModelError;

    fn try_from(repr: NodesRepr) -> Result<Self, Self::Error> {
        let mut nodes = BTreeMap::new();
        for node in repr.nodes {
            if nodes.contains_key(&node.id) {
                return Err(ModelError::DuplicateNode(node.id.to_string()));
            }
            nodes.insert(node.id.clone(), node);
        }
        let nodes = Self {
            nodes,
            master_node_id: repr.master_node_id,
            local_node_id: repr.local_node_id,
        };
        nodes.validate()?;
        Ok(nodes)
    }
}

impl From<DiscoveryNodes> for NodesRepr {
    fn from(nodes: DiscoveryNodes) -> Self {
        Self {
            nodes: nodes.nodes.into_values().collect(),
            master_node_id: nodes.master_node_id,
            local_node_id: nodes.local_node_id,
        }
    }
}

impl DiscoveryNodes {
    pub fn builder() -> DiscoveryNodesBuilder {
        DiscoveryNodesBuilder::default()
    }

    /// Start a builder pre-populated with `nodes`.
    pub fn builder_from(nodes: &DiscoveryNodes) -> DiscoveryNodesBuilder {
        DiscoveryNodesBuilder {
            nodes: nodes.nodes.clone(),
            master_node_id: nodes.master_node_id.clone(),
            local_node_id: nodes.local_node_id.clone(),
        }
    }

    /// Check that the master and local ids, when set, name members.
    pub fn validate(&self) -> Result<(), ModelError> {
        for id in [&self.master_node_id, &self.local_node_id].into_iter().flatten() {
            if !self.nodes.contains_key(id) {
                return Err(ModelError::UnknownMember(id.to_string()));
            }
        }
        Ok(())
    }

    /// Whether exactly this node (same id, same identity) is a member.
    pub fn node_exists(&self, node: &DiscoveryNode) -> bool {
        self.nodes.get(&node.id).is_some_and(|existing| existing == node)
    }

    pub fn node_exists_by_id(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&DiscoveryNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn data_nodes(&self) -> impl Iterator<Item = &DiscoveryNode> {
        self.nodes.values().filter(|n| n.is_data_node())
    }

    pub fn master_node_id(&self) -> Option<&NodeId> {
        self.master_node_id.as_ref()
    }

    pub fn local_node_id(&self) -> Option<&NodeId> {
        self.local_node_id.as_ref()
    }

    pub fn master_node(&self) -> Option<&DiscoveryNode> {
        self.master_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn local_node(&self) -> Option<&DiscoveryNode> {
        self.local_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// Whether the local node is currently the elected master.
    pub fn is_local_node_elected_master(&self) -> bool {
        match (&self.local_node_id, &self.master_node_id) {
            (Some(local), Some(master)) => local == master,
            _ => false,
        }
    }

    /// Membership changes from `previous` to `self`.
    pub fn delta(&self, previous: &DiscoveryNodes) -> NodesDelta {
        let removed = previous
            .nodes
            .values()
            .filter(|n| !self.node_exists(n))
            .map(|n| n.id.clone())
            .collect();
        let added = self
            .nodes
            .values()
            .filter(|n| !previous.node_exists(n))
            .map(|n| n.id.clone())
            .collect();

        NodesDelta {
            removed,
            added,
            previous_master: previous.master_node_id.clone(),
            new_master: self.master_node_id.clone(),
        }
    }
}

/// Mutable accumulator producing a [`DiscoveryNodes`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryNodesBuilder {
    nodes: BTreeMap<NodeId, DiscoveryNode>,
    master_node_id: Option<NodeId>,
    local_node_id: Option<NodeId>,
}

impl DiscoveryNodesBuilder {
    /// Add a node, replacing any node with the same id.
    pub fn add(mut self, node: DiscoveryNode) -> Self {
        self.put(node);
        self
    }

    pub fn put(&mut self, node: DiscoveryNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node by id. Removing the elected master or the local node
    /// clears that id.
    pub fn remove(&mut self, node: &DiscoveryNode) -> &mut Self {
        self.remove_by_id(&node.id)
    }

    pub fn remove_by_id(&mut self, id: &NodeId) -> &mut Self {
        self.nodes.remove(id);
        if self.master_node_id.as_ref() == Some(id) {
            self.master_node_id = None;
        }
        if self.local_node_id.as_ref() == Some(id) {
            self.local_node_id = None;
        }
        self
    }

    pub fn master(mut self, id: Option<NodeId>) -> Self {
        self.master_node_id = id;
        self
    }

    pub fn local(mut self, id: Option<NodeId>) -> Self {
        self.local_node_id = id;
        self
    }

    pub fn build(self) -> DiscoveryNodes {
        DiscoveryNodes {
            nodes: self.nodes,
            master_node_id: self.master_node_id,
            local_node_id: self.local_node_id,
        }
    }
}

/// Membership difference between two states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodesDelta {
    pub removed: Vec<NodeId>,
    pub added: Vec<NodeId>,
    pub previous_master: Option<NodeId>,
    pub new_master: Option<NodeId>,
}

impl NodesDelta {
    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty() || self.master_changed()
    }

    pub fn master_changed(&self) -> bool {
        self.previous_master != self.new_master
    }
}
