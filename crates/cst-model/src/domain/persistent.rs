use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClusterState, NodeId};

/// Explanation attached to tasks whose executor node left the cluster.
pub const LOST_NODE_EXPLANATION: &str = "awaiting reassignment after node loss";

/// Where a persistent task currently runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_node: Option<NodeId>,
    pub explanation: String,
}

impl Assignment {
    pub fn to(node: NodeId) -> Self {
        Self {
            executor_node: Some(node),
            explanation: String::new(),
        }
    }

    pub fn lost_node() -> Self {
        Self {
            executor_node: None,
            explanation: LOST_NODE_EXPLANATION.to_string(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.executor_node.is_some()
    }
}

/// A cluster-wide task that survives node restarts and is bound to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentTask {
    pub id: String,
    pub name: String,
    pub allocation_id: u64,
    pub assignment: Assignment,
}

/// All persistent tasks known to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentTasks {
    tasks: BTreeMap<String, PersistentTask>,
    last_allocation_id: u64,
}

impl PersistentTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task with a fresh allocation id.
    pub fn add(&mut self, id: impl Into<String>, name: impl Into<String>, assignment: Assignment) {
        self.last_allocation_id += 1;
        let id = id.into();
        self.tasks.insert(
            id.clone(),
            PersistentTask {
                id,
                name: name.into(),
                allocation_id: self.last_allocation_id,
                assignment,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&PersistentTask> {
        self.tasks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersistentTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn last_allocation_id(&self) -> u64 {
        self.last_allocation_id
    }

    /// Move a task to a new assignment; the task gets a new allocation id.
    ///
    /// Returns `false` if no task with this id exists.
    pub fn reassign(&mut self, id: &str, assignment: Assignment) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) => {
                self.last_allocation_id += 1;
                task.allocation_id = self.last_allocation_id;
                task.assignment = assignment;
                true
            }
            None => false,
        }
    }

    /// Unassign every task bound to a node that is no longer a member.
    ///
    /// Returns `state` untouched when no task is affected.
    pub fn disassociate_dead_nodes(state: ClusterState) -> ClusterState {
        let orphaned: Vec<String> = state
            .persistent_tasks
            .iter()
            .filter(|task| {
                task.assignment
                    .executor_node
                    .as_ref()
                    .is_some_and(|node| !state.nodes.node_exists_by_id(node))
            })
            .map(|task| task.id.clone())
            .collect();

        if orphaned.is_empty() {
            return state;
        }

        let mut tasks = state.persistent_tasks.clone();
        for id in &orphaned {
            tasks.reassign(id, Assignment::lost_node());
        }
        ClusterState::builder(&state).persistent_tasks(tasks).build()
    }
}
