use std::{fmt, sync::Arc};

use cst_model::{
    ClusterState, ClusterStatePublicationEvent, DiscoveryNode, DiscoveryNodes, DiscoveryNodesBuilder, PersistentTasks,
};
use tracing::{debug, info, instrument};

use crate::{
    allocation::AllocationService,
    error::ClusterError,
    executor::{ClusterStateTaskExecutor, TraceableTask},
    result::{ClusterTasksResult, ResultingState},
    tracer::Tracer,
};

/// Request to drop one node from the membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRemovalTask {
    node: DiscoveryNode,
    reason: String,
}

impl NodeRemovalTask {
    pub fn new(node: DiscoveryNode, reason: impl Into<String>) -> Self {
        Self {
            node,
            reason: reason.into(),
        }
    }

    pub fn node(&self) -> &DiscoveryNode {
        &self.node
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn into_traceable(self) -> TraceableTask<Self> {
        TraceableTask::new(self, "node-removal")
    }
}

impl fmt::Display for NodeRemovalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.node.append_description_without_attributes(&mut out);
        write!(f, "{out} reason: {}", self.reason)
    }
}

/// Removes departed nodes and cascades into persistent tasks and routing.
///
/// Never fails a single task: absent nodes are a successful no-op, and
/// allocation errors fail the whole batch.
pub struct NodeRemovalExecutor {
    allocation: Arc<dyn AllocationService>,
}

impl NodeRemovalExecutor {
    pub fn new(allocation: Arc<dyn AllocationService>) -> Self {
        Self { allocation }
    }

    fn remaining_nodes_state(current: &ClusterState, remaining: DiscoveryNodesBuilder) -> ClusterState {
        ClusterState::builder(current).nodes(remaining.build()).build()
    }
}

impl ClusterStateTaskExecutor for NodeRemovalExecutor {
    type Task = NodeRemovalTask;

    #[instrument(level = "debug", skip_all, fields(tasks = tasks.len(), version = current.version))]
    fn execute(
        &self,
        current: &Arc<ClusterState>,
        tasks: &[TraceableTask<NodeRemovalTask>],
        _tracer: &dyn Tracer,
    ) -> Result<ClusterTasksResult<NodeRemovalTask>, ClusterError> {
        let mut remaining = DiscoveryNodes::builder_from(&current.nodes);
        let mut removed = false;

        for traceable in tasks {
            // removal is a membership edit, there is nothing meaningful to trace
            let task = traceable.task();
            if current.nodes.node_exists(task.node()) {
                remaining.remove(task.node());
                removed = true;
            } else {
                debug!(task = %task, "node does not exist in cluster state, ignoring");
            }
        }

        let results = ClusterTasksResult::builder().successes(tasks);
        if !removed {
            return Ok(results.build(ResultingState::unchanged(current)));
        }

        let raw: Vec<&NodeRemovalTask> = tasks.iter().map(TraceableTask::task).collect();
        let reason = self.describe_tasks(&raw);

        let remaining_state = Self::remaining_nodes_state(current, remaining);
        let disassociated = PersistentTasks::disassociate_dead_nodes(remaining_state);
        let final_state = self
            .allocation
            .disassociate_dead_nodes(disassociated, true, &reason)?;

        Ok(results.build(ResultingState::changed(final_state)))
    }

    fn cluster_state_published(&self, event: &ClusterStatePublicationEvent) -> Result<(), ClusterError> {
        if event.nodes_removed() {
            let delta = event.nodes_delta();
            info!(
                version = event.state.version,
                removed = ?delta.removed,
                master_changed = delta.master_changed(),
                "nodes removed from published state"
            );
        }
        Ok(())
    }
}
