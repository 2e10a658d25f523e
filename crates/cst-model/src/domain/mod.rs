mod node_id;
pub use node_id::NodeId;

mod node;
pub use node::{DiscoveryNode, NodeRole};

mod nodes;
pub use nodes::{DiscoveryNodes, DiscoveryNodesBuilder, NodesDelta};

mod routing;
pub use routing::{RoutingTable, ShardId, ShardRouting, ShardState};

mod persistent;
pub use persistent::{Assignment, LOST_NODE_EXPLANATION, PersistentTask, PersistentTasks};

mod priority;
pub use priority::Priority;

mod state;
pub use state::{ClusterState, ClusterStateBuilder};

mod event;
pub use event::ClusterStatePublicationEvent;

/// Name of a cluster.
///
/// Carried on every state so log lines can be attributed.
pub type ClusterName = String;
