//! Span side channel around task execution.
//!
//! Tracer callbacks are fallible, but a failing tracer must never abort a
//! batch: callers go through [`trace_scope`] or [`CompoundTracer`], which log
//! the error and carry on.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Instant,
};

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::TraceError;

/// Something that can be traced as a span.
pub trait Traceable: Send + Sync {
    fn span_id(&self) -> &str;
    fn span_name(&self) -> &str;
    fn attributes(&self) -> &BTreeMap<String, String>;
    fn trace_parent(&self) -> Option<&str> {
        None
    }
    fn trace_state(&self) -> Option<&str> {
        None
    }
}

/// Span identity attached to a submitted task.
#[derive(Debug, Clone)]
pub struct SpanContext {
    span_id: String,
    span_name: String,
    attributes: BTreeMap<String, String>,
    trace_parent: Option<String>,
    trace_state: Option<String>,
}

impl SpanContext {
    pub fn new(span_name: impl Into<String>) -> Self {
        Self {
            span_id: Uuid::new_v4().simple().to_string(),
            span_name: span_name.into(),
            attributes: BTreeMap::new(),
            trace_parent: None,
            trace_state: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach W3C trace context propagated from the submitter.
    pub fn with_parent(mut self, trace_parent: impl Into<String>, trace_state: Option<String>) -> Self {
        self.trace_parent = Some(trace_parent.into());
        self.trace_state = trace_state;
        self
    }
}

impl Traceable for SpanContext {
    fn span_id(&self) -> &str {
        &self.span_id
    }
    fn span_name(&self) -> &str {
        &self.span_name
    }
    fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
    fn trace_parent(&self) -> Option<&str> {
        self.trace_parent.as_deref()
    }
    fn trace_state(&self) -> Option<&str> {
        self.trace_state.as_deref()
    }
}

pub trait Tracer: Send + Sync {
    /// Name used when reporting tracer failures.
    fn name(&self) -> &str {
        "tracer"
    }
    fn on_trace_started(&self, traceable: &dyn Traceable) -> Result<(), TraceError>;
    fn on_trace_stopped(&self, traceable: &dyn Traceable) -> Result<(), TraceError>;
}

/// Does nothing. Default for tests and for services without tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn name(&self) -> &str {
        "noop"
    }
    fn on_trace_started(&self, _traceable: &dyn Traceable) -> Result<(), TraceError> {
        Ok(())
    }
    fn on_trace_stopped(&self, _traceable: &dyn Traceable) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Emits span start/stop as `tracing` debug events with elapsed time.
#[derive(Debug, Default)]
pub struct LogTracer {
    started: Mutex<HashMap<String, Instant>>,
}

impl LogTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spans started but not yet stopped.
    pub fn open_spans(&self) -> usize {
        self.started.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Tracer for LogTracer {
    fn name(&self) -> &str {
        "log"
    }

    fn on_trace_started(&self, traceable: &dyn Traceable) -> Result<(), TraceError> {
        let mut started = self.started.lock().map_err(|_| TraceError::Poisoned)?;
        started.insert(traceable.span_id().to_string(), Instant::now());
        debug!(
            span_id = traceable.span_id(),
            span = traceable.span_name(),
            parent = traceable.trace_parent().unwrap_or("-"),
            "span started"
        );
        Ok(())
    }

    fn on_trace_stopped(&self, traceable: &dyn Traceable) -> Result<(), TraceError> {
        let mut started = self.started.lock().map_err(|_| TraceError::Poisoned)?;
        let at = started
            .remove(traceable.span_id())
            .ok_or_else(|| TraceError::UnknownSpan(traceable.span_id().to_string()))?;
        debug!(
            span_id = traceable.span_id(),
            span = traceable.span_name(),
            elapsed_us = at.elapsed().as_micros() as u64,
            "span stopped"
        );
        Ok(())
    }
}

/// Fans out to several tracers; a failing tracer is logged and skipped.
#[derive(Default, Clone)]
pub struct CompoundTracer {
    tracers: Vec<Arc<dyn Tracer>>,
}

impl CompoundTracer {
    pub fn new(tracers: Vec<Arc<dyn Tracer>>) -> Self {
        Self { tracers }
    }

    pub fn push(&mut self, tracer: Arc<dyn Tracer>) {
        self.tracers.push(tracer);
    }

    pub fn len(&self) -> usize {
        self.tracers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracers.is_empty()
    }
}

impl Tracer for CompoundTracer {
    fn name(&self) -> &str {
        "compound"
    }

    fn on_trace_started(&self, traceable: &dyn Traceable) -> Result<(), TraceError> {
        for tracer in &self.tracers {
            report(tracer.as_ref(), traceable, tracer.on_trace_started(traceable));
        }
        Ok(())
    }

    fn on_trace_stopped(&self, traceable: &dyn Traceable) -> Result<(), TraceError> {
        for tracer in &self.tracers {
            report(tracer.as_ref(), traceable, tracer.on_trace_stopped(traceable));
        }
        Ok(())
    }
}

fn report(tracer: &dyn Tracer, traceable: &dyn Traceable, res: Result<(), TraceError>) {
    if let Err(e) = res {
        error!(
            tracer = tracer.name(),
            span_id = traceable.span_id(),
            span = traceable.span_name(),
            error = %e,
            "tracer failed while tracing"
        );
    }
}

/// Started span that is stopped when dropped.
#[must_use = "the span stops as soon as the scope is dropped"]
pub struct TraceScope<'a> {
    tracer: &'a dyn Tracer,
    traceable: &'a dyn Traceable,
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        report(self.tracer, self.traceable, self.tracer.on_trace_stopped(self.traceable));
    }
}

/// Start a span on `tracer`; it stops when the returned guard drops, also on
/// unwinding or early return. Tracer errors are logged, never returned.
pub fn trace_scope<'a>(tracer: &'a dyn Tracer, traceable: &'a dyn Traceable) -> TraceScope<'a> {
    report(tracer, traceable, tracer.on_trace_started(traceable));
    TraceScope { tracer, traceable }
}
