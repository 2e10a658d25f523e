use std::{collections::BTreeMap, fmt, sync::Arc};

use cst_model::{ClusterState, ClusterStatePublicationEvent};

use crate::{
    error::ClusterError,
    result::{ClusterTasksResult, TaskToken},
    tracer::{SpanContext, Traceable, Tracer, trace_scope},
};

mod describe;
pub use describe::{MAX_DESCRIPTION_LEN, describe_tasks};

/// Folds a batch of same-type tasks into a new cluster state.
///
/// Executors run one batch at a time under the applier's single-writer lock.
/// `execute` must be synchronous and must not block on I/O.
pub trait ClusterStateTaskExecutor: Send + Sync {
    type Task: fmt::Display + Send + Sync;

    /// Apply `tasks` to `current`.
    ///
    /// Return [`crate::ResultingState::Unchanged`] when nothing needs to
    /// change; only `Changed` states are published. Every task must get
    /// exactly one outcome. An `Err` fails the whole batch.
    fn execute(
        &self,
        current: &Arc<ClusterState>,
        tasks: &[TraceableTask<Self::Task>],
        tracer: &dyn Tracer,
    ) -> Result<ClusterTasksResult<Self::Task>, ClusterError>;

    /// Whether the batch may only run on the elected master.
    fn run_only_on_master(&self) -> bool {
        true
    }

    /// Called once after a changed state has been published.
    ///
    /// Not called for unchanged batches. Errors are logged by the applier and
    /// never reach the publication pipeline.
    fn cluster_state_published(&self, _event: &ClusterStatePublicationEvent) -> Result<(), ClusterError> {
        Ok(())
    }

    /// Bounded, comma separated summary of `tasks` for logging.
    ///
    /// May be called several times with different subsets before execution.
    fn describe_tasks(&self, tasks: &[&Self::Task]) -> String {
        describe_tasks(tasks.iter().copied())
    }
}

/// A submitted task together with its correlation token and span identity.
#[derive(Debug, Clone)]
pub struct TraceableTask<T> {
    token: TaskToken,
    task: T,
    span: SpanContext,
}

impl<T> TraceableTask<T> {
    pub fn new(task: T, span_name: impl Into<String>) -> Self {
        Self::with_span(task, SpanContext::new(span_name))
    }

    pub fn with_span(task: T, span: SpanContext) -> Self {
        Self {
            token: TaskToken::next(),
            task,
            span,
        }
    }

    pub fn token(&self) -> TaskToken {
        self.token
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn span(&self) -> &SpanContext {
        &self.span
    }

    pub fn into_task(self) -> T {
        self.task
    }

    /// Run `f` on the task inside a span on `tracer`.
    pub fn process_task<R>(&self, tracer: &dyn Tracer, f: impl FnOnce(&T) -> R) -> R
    where
        T: Send + Sync,
    {
        let _scope = trace_scope(tracer, self);
        f(&self.task)
    }
}

impl<T: Send + Sync> Traceable for TraceableTask<T> {
    fn span_id(&self) -> &str {
        self.span.span_id()
    }
    fn span_name(&self) -> &str {
        self.span.span_name()
    }
    fn attributes(&self) -> &BTreeMap<String, String> {
        self.span.attributes()
    }
    fn trace_parent(&self) -> Option<&str> {
        self.span.trace_parent()
    }
    fn trace_state(&self) -> Option<&str> {
        self.span.trace_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoopTracer, ResultingState, TraceError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl Tracer for Recording {
        fn on_trace_started(&self, t: &dyn Traceable) -> Result<(), TraceError> {
            self.events.lock().unwrap().push(format!("start {}", t.span_name()));
            Ok(())
        }
        fn on_trace_stopped(&self, t: &dyn Traceable) -> Result<(), TraceError> {
            self.events.lock().unwrap().push(format!("stop {}", t.span_name()));
            Ok(())
        }
    }

    struct Echo;

    impl ClusterStateTaskExecutor for Echo {
        type Task = String;

        fn execute(
            &self,
            current: &Arc<ClusterState>,
            tasks: &[TraceableTask<String>],
            _tracer: &dyn Tracer,
        ) -> Result<ClusterTasksResult<String>, ClusterError> {
            Ok(ClusterTasksResult::builder()
                .successes(tasks)
                .build(ResultingState::unchanged(current)))
        }
    }

    #[test]
    fn defaults() {
        let echo = Echo;
        assert!(echo.run_only_on_master());

        let state = Arc::new(ClusterState::empty("test"));
        let event = ClusterStatePublicationEvent::new("src", state.clone(), state);
        assert!(echo.cluster_state_published(&event).is_ok());

        let a = "first".to_string();
        let empty = String::new();
        let b = "second".to_string();
        assert_eq!(echo.describe_tasks(&[&a, &empty, &b]), "first, second");
    }

    #[test]
    fn echo_returns_same_state() {
        let state = Arc::new(ClusterState::empty("test"));
        let tasks = vec![TraceableTask::new("x".to_string(), "echo")];
        let result = Echo.execute(&state, &tasks, &NoopTracer).unwrap();

        let resulting = result.resulting_state().unwrap();
        assert!(!resulting.is_changed());
        assert!(Arc::ptr_eq(resulting.state(), &state));
    }

    #[test]
    fn process_task_wraps_call_in_span() {
        let tracer = Recording::default();
        let task = TraceableTask::new(21, "double");

        let out = task.process_task(&tracer, |n| n * 2);

        assert_eq!(out, 42);
        assert_eq!(
            *tracer.events.lock().unwrap(),
            vec!["start double".to_string(), "stop double".to_string()]
        );
    }

    #[test]
    fn traceable_task_delegates_span_identity() {
        let span = SpanContext::new("remove-node")
            .with_attribute("node", "b")
            .with_parent("00-abc-def-01", None);
        let task = TraceableTask::with_span("b".to_string(), span.clone());

        assert_eq!(task.span_id(), span.span_id());
        assert_eq!(task.attributes().get("node").map(String::as_str), Some("b"));
        assert_eq!(task.trace_parent(), Some("00-abc-def-01"));
        assert_eq!(task.into_task(), "b");
    }
}
