//! Outcome of a batch: the resulting state plus one [`TaskResult`] per task.

use std::{
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use cst_model::ClusterState;

use crate::executor::TraceableTask;

/// Error attached to a failed task; shared so one failure can be fanned out.
pub type TaskError = Arc<dyn std::error::Error + Send + Sync>;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Correlation token identifying one submitted task.
///
/// Two tasks with equal content submitted separately get different tokens,
/// so their outcomes are tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskToken(u64);

impl TaskToken {
    /// Allocate a process-unique token. Tokens follow creation order, which
    /// need not match the order tasks are submitted in.
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Outcome of a single task.
#[derive(Debug, Clone)]
pub enum TaskResult {
    Success,
    Failure(TaskError),
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success)
    }

    /// The failure cause.
    ///
    /// # Panics
    /// When called on a successful result.
    pub fn failure(&self) -> &TaskError {
        match self {
            TaskResult::Failure(err) => err,
            TaskResult::Success => panic!("failure() called on a successful task result"),
        }
    }
}

/// Per-task outcomes of one batch, in the order they were recorded.
pub struct TaskResults<T> {
    entries: Vec<(TaskToken, TaskResult)>,
    index: HashMap<TaskToken, usize>,
    _task: PhantomData<fn() -> T>,
}

impl<T> TaskResults<T> {
    pub fn get(&self, token: TaskToken) -> Option<&TaskResult> {
        self.index.get(&token).map(|&i| &self.entries[i].1)
    }

    /// Outcome recorded for `task`.
    pub fn of(&self, task: &TraceableTask<T>) -> Option<&TaskResult> {
        self.get(task.token())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outcomes in recording order. Results handed out by the applier are
    /// in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskToken, &TaskResult)> {
        self.entries.iter().map(|(token, result)| (*token, result))
    }

    pub fn all_successful(&self) -> bool {
        self.entries.iter().all(|(_, result)| result.is_success())
    }

    /// Whether every task in `tasks` has exactly one outcome and nothing else does.
    pub fn covers(&self, tasks: &[TraceableTask<T>]) -> bool {
        self.entries.len() == tasks.len() && tasks.iter().all(|t| self.index.contains_key(&t.token()))
    }

    /// Reorder outcomes to follow `tasks`. Outcomes of tokens not in `tasks`
    /// keep their relative order after the listed ones.
    pub fn in_order_of(self, tasks: &[TraceableTask<T>]) -> Self {
        let position: HashMap<TaskToken, usize> = tasks.iter().enumerate().map(|(i, t)| (t.token(), i)).collect();
        let mut entries = self.entries;
        entries.sort_by_key(|(token, _)| position.get(token).copied().unwrap_or(usize::MAX));

        let mut ordered = Self::default();
        for (token, result) in entries {
            ordered.insert(token, result);
        }
        ordered
    }

    fn insert(&mut self, token: TaskToken, result: TaskResult) -> Option<&TaskResult> {
        if let Some(&i) = self.index.get(&token) {
            return Some(&self.entries[i].1);
        }
        self.index.insert(token, self.entries.len());
        self.entries.push((token, result));
        None
    }
}

impl<T> Default for TaskResults<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            _task: PhantomData,
        }
    }
}

impl<T> Clone for TaskResults<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            index: self.index.clone(),
            _task: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TaskResults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Explicit "did the state change" tag returned by executors.
///
/// The applier publishes only `Changed` states.
#[derive(Debug, Clone)]
pub enum ResultingState {
    Unchanged(Arc<ClusterState>),
    Changed(Arc<ClusterState>),
}

impl ResultingState {
    pub fn unchanged(current: &Arc<ClusterState>) -> Self {
        ResultingState::Unchanged(Arc::clone(current))
    }

    pub fn changed(state: ClusterState) -> Self {
        ResultingState::Changed(Arc::new(state))
    }

    pub fn state(&self) -> &Arc<ClusterState> {
        match self {
            ResultingState::Unchanged(state) | ResultingState::Changed(state) => state,
        }
    }

    pub fn into_state(self) -> Arc<ClusterState> {
        match self {
            ResultingState::Unchanged(state) | ResultingState::Changed(state) => state,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, ResultingState::Changed(_))
    }
}

/// What happened to a batch.
///
/// `resulting_state == None` means "apply the previous state unchanged".
/// `execution_results == None` only appears on the local-update sentinel
/// returned by [`crate::LocalClusterUpdateTask::unchanged`].
pub struct ClusterTasksResult<T> {
    resulting_state: Option<ResultingState>,
    execution_results: Option<TaskResults<T>>,
}

impl<T> ClusterTasksResult<T> {
    pub fn builder() -> ClusterTasksResultBuilder<T> {
        ClusterTasksResultBuilder {
            results: TaskResults::default(),
        }
    }

    pub(crate) fn sentinel() -> Self {
        Self {
            resulting_state: None,
            execution_results: None,
        }
    }

    pub fn resulting_state(&self) -> Option<&ResultingState> {
        self.resulting_state.as_ref()
    }

    pub fn execution_results(&self) -> Option<&TaskResults<T>> {
        self.execution_results.as_ref()
    }

    pub fn into_parts(self) -> (Option<ResultingState>, Option<TaskResults<T>>) {
        (self.resulting_state, self.execution_results)
    }
}

impl<T> fmt::Debug for ClusterTasksResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterTasksResult")
            .field("resulting_state", &self.resulting_state)
            .field("execution_results", &self.execution_results)
            .finish()
    }
}

/// Accumulates exactly one outcome per task.
pub struct ClusterTasksResultBuilder<T> {
    results: TaskResults<T>,
}

impl<T> ClusterTasksResultBuilder<T> {
    pub fn success(self, task: &TraceableTask<T>) -> Self {
        self.result(task.token(), TaskResult::Success)
    }

    pub fn successes<'a>(mut self, tasks: impl IntoIterator<Item = &'a TraceableTask<T>>) -> Self
    where
        T: 'a,
    {
        for task in tasks {
            self = self.success(task);
        }
        self
    }

    pub fn failure(self, task: &TraceableTask<T>, err: TaskError) -> Self {
        self.result(task.token(), TaskResult::Failure(err))
    }

    pub fn failures<'a>(mut self, tasks: impl IntoIterator<Item = &'a TraceableTask<T>>, err: TaskError) -> Self
    where
        T: 'a,
    {
        for task in tasks {
            self = self.failure(task, Arc::clone(&err));
        }
        self
    }

    fn result(mut self, token: TaskToken, result: TaskResult) -> Self {
        if let Some(existing) = self.results.insert(token, result) {
            panic!("{token} already has result {existing:?}");
        }
        self
    }

    pub fn build(self, resulting: ResultingState) -> ClusterTasksResult<T> {
        ClusterTasksResult {
            resulting_state: Some(resulting),
            execution_results: Some(self.results),
        }
    }

    /// Reseal `prior`'s state with this builder's outcomes, substituting
    /// `previous` when `prior` carries no state.
    pub fn build_from(self, prior: ClusterTasksResult<T>, previous: &Arc<ClusterState>) -> ClusterTasksResult<T> {
        let resulting = prior
            .resulting_state
            .unwrap_or_else(|| ResultingState::unchanged(previous));
        self.build(resulting)
    }

    /// Outcomes without a state, for batches that never reached an executor.
    pub fn into_results(self) -> TaskResults<T> {
        self.results
    }
}
