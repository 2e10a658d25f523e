//! Single-writer applier: runs one batch at a time against the current state
//! and publishes the result when it changed.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cst_model::{ClusterState, ClusterStatePublicationEvent};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::ClusterError,
    executor::{ClusterStateTaskExecutor, TraceableTask},
    local::LocalClusterUpdateTask,
    result::{ClusterTasksResult, ResultingState, TaskResults},
    tracer::Tracer,
};

mod config;
pub use config::ServiceConfig;

mod publisher;
pub use publisher::{LocalPublisher, Publisher};

/// What the applier did with a batch.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// State after the batch (the previous one when nothing changed).
    pub state: Arc<ClusterState>,
    /// Whether a new state was published.
    pub published: bool,
    /// One outcome per submitted task.
    pub results: TaskResults<T>,
}

pub struct ClusterService {
    config: ServiceConfig,
    state: watch::Sender<Arc<ClusterState>>,
    writer: Mutex<()>,
    publisher: Arc<dyn Publisher>,
    tracer: Arc<dyn Tracer>,
}

impl ClusterService {
    pub fn new(
        config: ServiceConfig,
        initial: ClusterState,
        publisher: Arc<dyn Publisher>,
        tracer: Arc<dyn Tracer>,
    ) -> Result<Self, ClusterError> {
        config.validate()?;
        initial.nodes.validate()?;
        let (state, _) = watch::channel(Arc::new(initial));

        info!(node = %config.node_name, "cluster service ready");
        Ok(Self {
            config,
            state,
            writer: Mutex::new(()),
            publisher,
            tracer,
        })
    }

    /// Last applied state.
    pub fn state(&self) -> Arc<ClusterState> {
        Arc::clone(&self.state.borrow())
    }

    /// Watch applied states.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Execute one batch of same-type tasks.
    ///
    /// Per-task failures are reported in the outcome. An `Err` means the
    /// whole batch failed and nothing was applied.
    #[instrument(level = "debug", skip(self, executor, tasks), fields(node = %self.config.node_name, tasks = tasks.len()))]
    pub async fn submit_batch<E>(
        &self,
        source: &str,
        executor: &E,
        tasks: Vec<TraceableTask<E::Task>>,
    ) -> Result<BatchOutcome<E::Task>, ClusterError>
    where
        E: ClusterStateTaskExecutor,
    {
        let _writer = self.writer.lock().await;
        let previous = self.state();

        let summary = {
            let raw: Vec<&E::Task> = tasks.iter().map(TraceableTask::task).collect();
            executor.describe_tasks(&raw)
        };
        debug!(source, tasks = %summary, "executing cluster state update");

        if executor.run_only_on_master() && !previous.nodes.is_local_node_elected_master() {
            debug!(source, "local node is not the elected master, failing tasks");
            let results = ClusterTasksResult::builder()
                .failures(&tasks, Arc::new(ClusterError::NotMaster))
                .into_results();
            return Ok(BatchOutcome {
                state: previous,
                published: false,
                results,
            });
        }

        let started = Instant::now();
        let result = executor
            .execute(&previous, &tasks, self.tracer.as_ref())
            .inspect_err(|e| warn!(source, error = %e, "failed to execute cluster state update"))?;
        let compute = started.elapsed();

        let (resulting, results) = result.into_parts();
        let results = results.unwrap_or_default();
        assert!(
            results.covers(&tasks),
            "executor for [{source}] returned {} results for {} tasks",
            results.len(),
            tasks.len()
        );
        let results = results.in_order_of(&tasks);

        let resulting = resulting.unwrap_or_else(|| ResultingState::unchanged(&previous));
        let ResultingState::Changed(computed) = resulting else {
            debug!(source, elapsed_ms = compute.as_millis() as u64, "no change in cluster state");
            self.warn_if_slow(source, compute);
            return Ok(BatchOutcome {
                state: previous,
                published: false,
                results,
            });
        };

        let new_state = Arc::new(
            ClusterState::builder(&computed)
                .version(previous.version + 1)
                .build(),
        );
        let mut event = ClusterStatePublicationEvent::new(source, Arc::clone(&previous), Arc::clone(&new_state));
        event.compute_duration = compute;

        let publish_started = Instant::now();
        self.publisher
            .publish(&event)
            .await
            .inspect_err(|e| warn!(source, version = new_state.version, error = %e, "failed to publish cluster state"))?;
        event.publication_duration = publish_started.elapsed();

        self.state.send_replace(Arc::clone(&new_state));
        info!(source, version = new_state.version, uuid = %new_state.state_uuid, "cluster state applied");

        if let Err(e) = executor.cluster_state_published(&event) {
            error!(source, error = %e, "post-publication callback failed");
        }

        self.warn_if_slow(source, compute + event.publication_duration);
        Ok(BatchOutcome {
            state: new_state,
            published: true,
            results,
        })
    }

    /// Run a local update; it is its own executor and always a batch of one.
    pub async fn submit_local(
        &self,
        task: LocalClusterUpdateTask,
    ) -> Result<BatchOutcome<LocalClusterUpdateTask>, ClusterError> {
        let executor = task.clone();
        let source = task.source().to_string();
        self.submit_batch(&source, &executor, vec![task.into_traceable()])
            .await
    }

    fn warn_if_slow(&self, source: &str, elapsed: Duration) {
        if elapsed > self.config.slow_task_logging_threshold() {
            warn!(
                source,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_task_logging_threshold_ms,
                "took too long to compute and publish cluster state"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DefaultAllocationService, NodeRemovalExecutor, NodeRemovalTask, NoopTracer, TaskToken,
    };
    use async_trait::async_trait;
    use cst_model::{DiscoveryNode, DiscoveryNodes, ModelError, NodeId, NodeRole};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn node(s: &str) -> DiscoveryNode {
        DiscoveryNode::new(id(s), s, format!("{s}:9300")).with_roles([NodeRole::Master, NodeRole::Data])
    }

    fn three_nodes(local: &str) -> ClusterState {
        let nodes = DiscoveryNodes::builder()
            .add(node("a"))
            .add(node("b"))
            .add(node("c"))
            .master(Some(id("a")))
            .local(Some(id(local)))
            .build();
        ClusterState::builder(&ClusterState::empty("svc"))
            .nodes(nodes)
            .version(7)
            .build()
    }

    fn service(initial: ClusterState) -> ClusterService {
        service_with(initial, Arc::new(LocalPublisher))
    }

    fn service_with(initial: ClusterState, publisher: Arc<dyn Publisher>) -> ClusterService {
        ClusterService::new(
            ServiceConfig::default().with_node_name("test-node"),
            initial,
            publisher,
            Arc::new(NoopTracer),
        )
        .unwrap()
    }

    /// Node removal that counts executions and post-publication callbacks.
    struct Observed {
        inner: NodeRemovalExecutor,
        executed: AtomicUsize,
        published: AtomicUsize,
        fail_hook: bool,
    }

    impl Observed {
        fn new() -> Self {
            Self {
                inner: NodeRemovalExecutor::new(Arc::new(DefaultAllocationService)),
                executed: AtomicUsize::new(0),
                published: AtomicUsize::new(0),
                fail_hook: false,
            }
        }
    }

    impl ClusterStateTaskExecutor for Observed {
        type Task = NodeRemovalTask;

        fn execute(
            &self,
            current: &Arc<ClusterState>,
            tasks: &[TraceableTask<NodeRemovalTask>],
            tracer: &dyn Tracer,
        ) -> Result<ClusterTasksResult<NodeRemovalTask>, ClusterError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(current, tasks, tracer)
        }

        fn cluster_state_published(&self, _event: &ClusterStatePublicationEvent) -> Result<(), ClusterError> {
            self.published.fetch_add(1, Ordering::SeqCst);
            if self.fail_hook {
                return Err(ClusterError::Execution("listener broke".into()));
            }
            Ok(())
        }
    }

    /// Records outcomes back to front and leaves the state alone.
    struct Backwards;

    impl ClusterStateTaskExecutor for Backwards {
        type Task = String;

        fn execute(
            &self,
            current: &Arc<ClusterState>,
            tasks: &[TraceableTask<String>],
            _tracer: &dyn Tracer,
        ) -> Result<ClusterTasksResult<String>, ClusterError> {
            Ok(ClusterTasksResult::builder()
                .successes(tasks.iter().rev())
                .build(ResultingState::unchanged(current)))
        }
    }

    struct RejectingPublisher;

    #[async_trait]
    impl Publisher for RejectingPublisher {
        async fn publish(&self, _event: &ClusterStatePublicationEvent) -> Result<(), ClusterError> {
            Err(ClusterError::Publish("no quorum".into()))
        }
    }

    #[tokio::test]
    async fn removal_batch_end_to_end() {
        let svc = service(three_nodes("a"));
        let executor = Observed::new();
        let tasks = vec![
            NodeRemovalTask::new(node("b"), "disconnected").into_traceable(),
            NodeRemovalTask::new(node("z"), "already left").into_traceable(),
        ];
        let (b, z) = (tasks[0].token(), tasks[1].token());

        let outcome = svc.submit_batch("node-left", &executor, tasks).await.unwrap();

        assert!(outcome.published);
        let members: Vec<_> = outcome.state.nodes.ids().map(|id| id.to_string()).collect();
        assert_eq!(members, vec!["a", "c"]);
        assert!(outcome.results.get(b).unwrap().is_success());
        assert!(outcome.results.get(z).unwrap().is_success());
        assert_eq!(executor.published.load(Ordering::SeqCst), 1);

        assert_eq!(outcome.state.version, 8);
        assert!(Arc::ptr_eq(&svc.state(), &outcome.state));
    }

    #[tokio::test]
    async fn outcomes_are_reported_in_submission_order() {
        let svc = service(three_nodes("a"));
        let second = TraceableTask::new("second".to_string(), "t");
        let first = TraceableTask::new("first".to_string(), "t");
        let submitted = vec![first.token(), second.token()];

        let outcome = svc.submit_batch("ordered", &Backwards, vec![first, second]).await.unwrap();

        let reported: Vec<TaskToken> = outcome.results.iter().map(|(token, _)| token).collect();
        assert_eq!(reported, submitted);
    }

    #[tokio::test]
    async fn unchanged_batch_is_not_published() {
        let svc = service(three_nodes("a"));
        let before = svc.state();
        let executor = Observed::new();
        let tasks = vec![NodeRemovalTask::new(node("z"), "already left").into_traceable()];

        let outcome = svc.submit_batch("node-left", &executor, tasks).await.unwrap();

        assert!(!outcome.published);
        assert!(Arc::ptr_eq(&outcome.state, &before));
        assert!(outcome.results.all_successful());
        assert_eq!(executor.published.load(Ordering::SeqCst), 0);
        assert_eq!(svc.state().version, 7);
    }

    #[tokio::test]
    async fn master_gated_executor_fails_tasks_on_follower() {
        let svc = service(three_nodes("b"));
        let executor = Observed::new();
        let tasks = vec![NodeRemovalTask::new(node("c"), "left").into_traceable()];

        let outcome = svc.submit_batch("node-left", &executor, tasks).await.unwrap();

        assert!(!outcome.published);
        assert_eq!(executor.executed.load(Ordering::SeqCst), 0);
        let (_, result) = outcome.results.iter().next().unwrap();
        assert_eq!(result.failure().to_string(), "no longer master, task rejected");
    }

    #[tokio::test]
    async fn local_update_runs_on_follower() {
        let svc = service(three_nodes("b"));
        let task = LocalClusterUpdateTask::from_fn("drop-routing", |state| {
            let next = ClusterState::builder(state).build();
            Ok(ClusterTasksResult::builder().build(ResultingState::changed(next)))
        });

        let outcome = svc.submit_local(task).await.unwrap();
        assert!(outcome.published);
        assert_eq!(outcome.state.version, 8);
        assert!(outcome.results.all_successful());
    }

    #[tokio::test]
    async fn local_unchanged_sentinel_keeps_state() {
        let svc = service(three_nodes("b"));
        let before = svc.state();
        let task = LocalClusterUpdateTask::from_fn("noop", |_state| Ok(LocalClusterUpdateTask::unchanged()));

        let outcome = svc.submit_local(task).await.unwrap();
        assert!(!outcome.published);
        assert!(Arc::ptr_eq(&outcome.state, &before));
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn execution_error_fails_the_batch() {
        let svc = service(three_nodes("a"));
        let task = LocalClusterUpdateTask::from_fn("broken", |_state| {
            Err(ClusterError::Execution("bad metadata".into()))
        });

        let err = svc.submit_local(task).await.unwrap_err();
        assert!(matches!(err, ClusterError::Execution(_)));
        assert_eq!(svc.state().version, 7);
    }

    #[tokio::test]
    async fn publication_failure_keeps_previous_state() {
        let svc = service_with(three_nodes("a"), Arc::new(RejectingPublisher));
        let executor = Observed::new();
        let tasks = vec![NodeRemovalTask::new(node("b"), "left").into_traceable()];

        let err = svc.submit_batch("node-left", &executor, tasks).await.unwrap_err();

        assert!(matches!(err, ClusterError::Publish(_)));
        assert_eq!(svc.state().nodes.len(), 3);
        assert_eq!(executor.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_publication_hook_is_swallowed() {
        let svc = service(three_nodes("a"));
        let mut executor = Observed::new();
        executor.fail_hook = true;
        let tasks = vec![NodeRemovalTask::new(node("b"), "left").into_traceable()];

        let outcome = svc.submit_batch("node-left", &executor, tasks).await.unwrap();
        assert!(outcome.published);
        assert_eq!(executor.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_see_applied_state() {
        let svc = service(three_nodes("a"));
        let mut rx = svc.subscribe();
        let executor = Observed::new();
        let tasks = vec![NodeRemovalTask::new(node("c"), "left").into_traceable()];

        svc.submit_batch("node-left", &executor, tasks).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().nodes.len(), 2);
    }

    struct Forgetful;

    impl ClusterStateTaskExecutor for Forgetful {
        type Task = String;

        fn execute(
            &self,
            current: &Arc<ClusterState>,
            _tasks: &[TraceableTask<String>],
            _tracer: &dyn Tracer,
        ) -> Result<ClusterTasksResult<String>, ClusterError> {
            Ok(ClusterTasksResult::builder().build(ResultingState::unchanged(current)))
        }

        fn run_only_on_master(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    #[should_panic(expected = "returned 0 results for 1 tasks")]
    async fn missing_task_results_are_fatal() {
        let svc = service(three_nodes("a"));
        let tasks = vec![TraceableTask::new("lost".to_string(), "forgetful")];
        let _ = svc.submit_batch("forgetful", &Forgetful, tasks).await;
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = ClusterService::new(
            ServiceConfig::default().with_node_name(""),
            ClusterState::empty("svc"),
            Arc::new(LocalPublisher),
            Arc::new(NoopTracer),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[test]
    fn initial_state_with_stray_master_is_rejected() {
        let nodes = DiscoveryNodes::builder()
            .add(node("a"))
            .master(Some(id("gone")))
            .local(Some(id("a")))
            .build();
        let initial = ClusterState::builder(&ClusterState::empty("svc")).nodes(nodes).build();

        let err = ClusterService::new(
            ServiceConfig::default().with_node_name("test-node"),
            initial,
            Arc::new(LocalPublisher),
            Arc::new(NoopTracer),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ClusterError::Model(ModelError::UnknownMember(ref id)) if id == "gone"));
        assert_eq!(err.to_string(), "model error: node gone is not a member");
    }
}
