//! Single-task, non-batched updates that run on every node.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use cst_model::{ClusterState, Priority};

use crate::{
    error::ClusterError,
    executor::{ClusterStateTaskExecutor, TraceableTask},
    result::ClusterTasksResult,
    tracer::{Tracer, trace_scope},
};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Update logic of a [`LocalClusterUpdateTask`].
pub trait LocalUpdate: Send + Sync {
    /// Compute the outcome for the one implicit task.
    ///
    /// Return [`LocalClusterUpdateTask::unchanged`] to leave the state as is.
    fn execute(&self, current: &Arc<ClusterState>) -> Result<ClusterTasksResult<LocalClusterUpdateTask>, ClusterError>;
}

impl<F> LocalUpdate for F
where
    F: Fn(&Arc<ClusterState>) -> Result<ClusterTasksResult<LocalClusterUpdateTask>, ClusterError> + Send + Sync,
{
    fn execute(&self, current: &Arc<ClusterState>) -> Result<ClusterTasksResult<LocalClusterUpdateTask>, ClusterError> {
        self(current)
    }
}

/// A task that is its own executor and is never batched with others.
///
/// Not gated on master: local updates apply on every node.
#[derive(Clone)]
pub struct LocalClusterUpdateTask {
    id: u64,
    source: String,
    priority: Priority,
    timeout: Option<Duration>,
    update: Arc<dyn LocalUpdate>,
}

impl LocalClusterUpdateTask {
    pub fn new(source: impl Into<String>, update: Arc<dyn LocalUpdate>) -> Self {
        Self {
            id: NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed),
            source: source.into(),
            priority: Priority::Normal,
            timeout: None,
            update,
        }
    }

    pub fn from_fn<F>(source: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arc<ClusterState>) -> Result<ClusterTasksResult<LocalClusterUpdateTask>, ClusterError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(source, Arc::new(f))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Advisory deadline for the scheduler; not enforced here.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sentinel for "no changes were made": no state and no outcome map.
    pub fn unchanged() -> ClusterTasksResult<LocalClusterUpdateTask> {
        ClusterTasksResult::sentinel()
    }

    /// Wrap for submission, using the source as span name.
    pub fn into_traceable(self) -> TraceableTask<Self> {
        let span = self.source.clone();
        TraceableTask::new(self, span)
    }
}

impl fmt::Debug for LocalClusterUpdateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClusterUpdateTask")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for LocalClusterUpdateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl ClusterStateTaskExecutor for LocalClusterUpdateTask {
    type Task = LocalClusterUpdateTask;

    fn execute(
        &self,
        current: &Arc<ClusterState>,
        tasks: &[TraceableTask<LocalClusterUpdateTask>],
        tracer: &dyn Tracer,
    ) -> Result<ClusterTasksResult<LocalClusterUpdateTask>, ClusterError> {
        assert!(
            tasks.len() == 1 && tasks[0].task().id == self.id,
            "expected one-element task list containing local task {} but was {:?}",
            self.id,
            tasks.iter().map(|t| t.task().id).collect::<Vec<_>>()
        );

        let _scope = trace_scope(tracer, &tasks[0]);
        let result = self.update.execute(current)?;
        Ok(ClusterTasksResult::builder()
            .successes(tasks)
            .build_from(result, current))
    }

    fn run_only_on_master(&self) -> bool {
        false
    }

    // the source already describes the single task
    fn describe_tasks(&self, _tasks: &[&LocalClusterUpdateTask]) -> String {
        String::new()
    }
}
