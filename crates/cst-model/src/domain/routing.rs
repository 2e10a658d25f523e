use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Identifies one shard of one index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardId {
    pub index: String,
    pub shard: u32,
}

impl ShardId {
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.shard)
    }
}

/// Lifecycle of a single shard copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShardState {
    /// Not allocated to any node.
    Unassigned,
    /// Allocated, recovery in progress.
    Initializing,
    /// Allocated and serving.
    Started,
}

/// One copy (primary or replica) of a shard and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardRouting {
    pub shard_id: ShardId,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    pub state: ShardState,
}

impl ShardRouting {
    pub fn unassigned(shard_id: ShardId, primary: bool) -> Self {
        Self {
            shard_id,
            primary,
            node: None,
            state: ShardState::Unassigned,
        }
    }

    pub fn started(shard_id: ShardId, primary: bool, node: NodeId) -> Self {
        Self {
            shard_id,
            primary,
            node: Some(node),
            state: ShardState::Started,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.node.is_some()
    }

    pub fn is_assigned_to(&self, node: &NodeId) -> bool {
        self.node.as_ref() == Some(node)
    }
}

/// Placement of every shard copy in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    shards: Vec<ShardRouting>,
}

impl RoutingTable {
    pub fn new(shards: Vec<ShardRouting>) -> Self {
        Self { shards }
    }

    pub fn shards(&self) -> &[ShardRouting] {
        &self.shards
    }

    pub fn shards_on<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a ShardRouting> {
        self.shards.iter().filter(move |s| s.is_assigned_to(node))
    }

    pub fn unassigned(&self) -> impl Iterator<Item = &ShardRouting> {
        self.shards.iter().filter(|s| s.state == ShardState::Unassigned)
    }

    /// All copies of one shard.
    pub fn copies_of<'a>(&'a self, shard_id: &'a ShardId) -> impl Iterator<Item = &'a ShardRouting> {
        self.shards.iter().filter(move |s| &s.shard_id == shard_id)
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn shards_on_and_unassigned() {
        let table = RoutingTable::new(vec![
            ShardRouting::started(ShardId::new("logs", 0), true, id("a")),
            ShardRouting::started(ShardId::new("logs", 0), false, id("b")),
            ShardRouting::unassigned(ShardId::new("logs", 1), true),
        ]);

        assert_eq!(table.shards_on(&id("a")).count(), 1);
        assert_eq!(table.unassigned().count(), 1);
        assert_eq!(table.copies_of(&ShardId::new("logs", 0)).count(), 2);
    }

    #[test]
    fn shard_id_display() {
        assert_eq!(ShardId::new("logs", 3).to_string(), "[logs][3]");
    }
}
