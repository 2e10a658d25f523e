use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use cst_core::{
    ClusterService, ClusterTasksResult, CompoundTracer, DefaultAllocationService, LocalClusterUpdateTask,
    LocalPublisher, LogTracer, NodeRemovalExecutor, NodeRemovalTask, ResultingState, ServiceConfig, Tracer,
};
use cst_model::{
    Assignment, ClusterState, DiscoveryNode, DiscoveryNodes, NodeId, NodeRole, PersistentTasks, RoutingTable,
    ShardId, ShardRouting,
};
use cst_observe::{LoggerConfig, init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    init_logger(&LoggerConfig::from_env()?)?;

    // 2) Initial three node cluster with one replicated index and a persistent task
    let initial = bootstrap_state().context("building initial cluster state")?;
    info!(state = %initial.summary(), members = initial.nodes.len(), "bootstrapped");

    // 3) Applier
    let tracers: Vec<Arc<dyn Tracer>> = vec![Arc::new(LogTracer::new())];
    let service = ClusterService::new(
        ServiceConfig::default(),
        initial,
        Arc::new(LocalPublisher),
        Arc::new(CompoundTracer::new(tracers)),
    )?;

    // 4) Node "b" dropped out, node "z" was already gone
    let executor = NodeRemovalExecutor::new(Arc::new(DefaultAllocationService::new()));
    let b = node("b")?;
    let z = node("z")?;
    let tasks = vec![
        NodeRemovalTask::new(b, "followers check retry count exceeded").into_traceable(),
        NodeRemovalTask::new(z, "already left").into_traceable(),
    ];

    let outcome = service.submit_batch("node-left", &executor, tasks).await?;
    for (token, result) in outcome.results.iter() {
        if result.is_success() {
            info!(%token, "task succeeded");
        } else {
            warn!(%token, error = %result.failure(), "task failed");
        }
    }
    info!(
        published = outcome.published,
        state = %outcome.state.summary(),
        members = ?outcome.state.nodes.ids().collect::<Vec<_>>(),
        "node removal applied"
    );

    // 5) Local, non-master-gated update
    let local = LocalClusterUpdateTask::from_fn("refresh-local-view", |state| {
        if state.routing.unassigned().count() == 0 {
            return Ok(LocalClusterUpdateTask::unchanged());
        }
        let next = ClusterState::builder(state).build();
        Ok(ClusterTasksResult::builder().build(ResultingState::changed(next)))
    });
    let outcome = service.submit_local(local).await?;
    info!(published = outcome.published, state = %outcome.state.summary(), "local update applied");

    Ok(())
}

fn node(id: &str) -> anyhow::Result<DiscoveryNode> {
    Ok(DiscoveryNode::new(NodeId::new(id)?, format!("node-{id}"), format!("{id}.cluster.local:9300"))
        .with_roles([NodeRole::Master, NodeRole::Data]))
}

fn bootstrap_state() -> anyhow::Result<ClusterState> {
    let a = NodeId::new("a")?;
    let b = NodeId::new("b")?;
    let c = NodeId::new("c")?;

    let nodes = DiscoveryNodes::builder()
        .add(node("a")?)
        .add(node("b")?)
        .add(node("c")?)
        .master(Some(a.clone()))
        .local(Some(a.clone()))
        .build();

    let routing = RoutingTable::new(vec![
        ShardRouting::started(ShardId::new("logs", 0), true, b.clone()),
        ShardRouting::started(ShardId::new("logs", 0), false, c.clone()),
        ShardRouting::started(ShardId::new("logs", 1), true, a),
        ShardRouting::started(ShardId::new("logs", 1), false, b.clone()),
    ]);

    let mut tasks = PersistentTasks::new();
    tasks.add("rollup-daily", "rollup", Assignment::to(b));
    tasks.add("transform-users", "transform", Assignment::to(c));

    Ok(ClusterState::builder(&ClusterState::empty("demo"))
        .nodes(nodes)
        .routing(routing)
        .persistent_tasks(tasks)
        .build())
}
