pub mod error;
pub use error::{ClusterError, TraceError};

pub mod result;
pub use result::{ClusterTasksResult, ResultingState, TaskError, TaskResult, TaskResults, TaskToken};

pub mod tracer;
pub use tracer::{CompoundTracer, LogTracer, NoopTracer, SpanContext, Traceable, Tracer};

pub mod executor;
pub use executor::{ClusterStateTaskExecutor, TraceableTask, describe_tasks};

pub mod local;
pub use local::{LocalClusterUpdateTask, LocalUpdate};

pub mod allocation;
pub use allocation::{AllocationService, DefaultAllocationService};

pub mod removal;
pub use removal::{NodeRemovalExecutor, NodeRemovalTask};

pub mod service;
pub use service::{BatchOutcome, ClusterService, LocalPublisher, Publisher, ServiceConfig};
