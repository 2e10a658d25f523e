use std::collections::HashMap;

use cst_model::{ClusterState, NodeId, RoutingTable, ShardRouting, ShardState};
use tracing::{debug, info, instrument, warn};

use crate::error::ClusterError;

/// Computes shard placement after membership changes.
///
/// Shared across executors and batches; implementations hold no mutable
/// state between calls.
pub trait AllocationService: Send + Sync {
    /// Fail shards on nodes that left, promote replicas of lost primaries and,
    /// if `reroute` is set, place unassigned shards on live data nodes.
    fn disassociate_dead_nodes(
        &self,
        state: ClusterState,
        reroute: bool,
        reason: &str,
    ) -> Result<ClusterState, ClusterError>;
}

/// Least-loaded placement with the same-shard rule: never two copies of one
/// shard on one node.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocationService;

impl DefaultAllocationService {
    pub fn new() -> Self {
        Self
    }
}

impl AllocationService for DefaultAllocationService {
    #[instrument(level = "debug", skip(self, state), fields(version = state.version))]
    fn disassociate_dead_nodes(
        &self,
        state: ClusterState,
        reroute: bool,
        reason: &str,
    ) -> Result<ClusterState, ClusterError> {
        let mut shards = state.routing.shards().to_vec();
        validate(&shards)?;

        let mut changed = fail_shards_on_dead_nodes(&state, &mut shards);
        if reroute {
            changed |= assign_unassigned(&state, &mut shards);
        }

        if !changed {
            debug!("routing unaffected");
            return Ok(state);
        }

        info!(
            unassigned = shards.iter().filter(|s| s.state == ShardState::Unassigned).count(),
            "routing updated after node departure"
        );
        Ok(ClusterState::builder(&state)
            .routing(RoutingTable::new(shards))
            .build())
    }
}

fn validate(shards: &[ShardRouting]) -> Result<(), ClusterError> {
    match shards
        .iter()
        .find(|s| s.state != ShardState::Unassigned && s.node.is_none())
    {
        Some(s) => Err(ClusterError::Allocation(format!(
            "shard {} is {:?} but has no node",
            s.shard_id, s.state
        ))),
        None => Ok(()),
    }
}

fn fail_shards_on_dead_nodes(state: &ClusterState, shards: &mut [ShardRouting]) -> bool {
    let mut lost_primaries = Vec::new();
    let mut changed = false;

    for shard in shards.iter_mut() {
        if let Some(node) = &shard.node
            && !state.nodes.node_exists_by_id(node)
        {
            debug!(shard = %shard.shard_id, node = %node, primary = shard.primary, "failing shard on departed node");
            if shard.primary {
                lost_primaries.push(shard.shard_id.clone());
            }
            *shard = ShardRouting::unassigned(shard.shard_id.clone(), shard.primary);
            changed = true;
        }
    }

    for shard_id in lost_primaries {
        let replica = shards.iter_mut().find(|s| {
            s.shard_id == shard_id && !s.primary && s.state == ShardState::Started && s.node.is_some()
        });
        let Some(replica) = replica else {
            warn!(shard = %shard_id, "primary lost and no started replica to promote");
            continue;
        };
        replica.primary = true;
        info!(shard = %shard_id, node = ?replica.node, "promoted replica to primary");

        if let Some(lost) = shards
            .iter_mut()
            .find(|s| s.shard_id == shard_id && s.primary && s.node.is_none())
        {
            lost.primary = false;
        }
    }
    changed
}

fn assign_unassigned(state: &ClusterState, shards: &mut [ShardRouting]) -> bool {
    let data_nodes: Vec<&NodeId> = state.nodes.data_nodes().map(|n| &n.id).collect();
    if data_nodes.is_empty() {
        return false;
    }

    let mut load: HashMap<&NodeId, usize> = data_nodes.iter().map(|id| (*id, 0)).collect();
    for shard in shards.iter() {
        if let Some(node) = &shard.node
            && let Some(count) = load.get_mut(node)
        {
            *count += 1;
        }
    }

    let mut changed = false;
    // primaries first, replicas need an assigned primary
    for primary_pass in [true, false] {
        for i in 0..shards.len() {
            let view: &[ShardRouting] = shards;
            let shard = &view[i];
            if shard.state != ShardState::Unassigned || shard.primary != primary_pass {
                continue;
            }
            if !primary_pass && !has_assigned_primary(view, i) {
                continue;
            }

            let target = data_nodes
                .iter()
                .filter(|node| !holds_copy(view, i, node))
                .min_by_key(|node| (load.get(**node).copied().unwrap_or(0), (**node).clone()))
                .copied();

            let Some(target) = target else {
                debug!(shard = %shards[i].shard_id, "no eligible node, shard stays unassigned");
                continue;
            };

            shards[i].node = Some(target.clone());
            shards[i].state = ShardState::Initializing;
            if let Some(count) = load.get_mut(target) {
                *count += 1;
            }
            changed = true;
        }
    }
    changed
}

fn has_assigned_primary(shards: &[ShardRouting], i: usize) -> bool {
    let id = &shards[i].shard_id;
    shards
        .iter()
        .any(|s| &s.shard_id == id && s.primary && s.is_assigned())
}

fn holds_copy(shards: &[ShardRouting], i: usize, node: &NodeId) -> bool {
    let id = &shards[i].shard_id;
    shards
        .iter()
        .any(|s| &s.shard_id == id && s.is_assigned_to(node))
}
