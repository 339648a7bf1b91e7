//! Interceptor configuration.

use std::sync::Arc;

use opentelemetry::global::{BoxedSpan, BoxedTracer};

use crate::hooks::{FinishHook, HookOutcome, StartHook};
use crate::system::{TracerFactory, TracerSource};
use crate::tracer::{RequestHead, RequestOutcome};

/// Configuration record for a [`RequestTracer`], read once at construction.
///
/// ```
/// use tower_request_trace::{HookOutcome, TraceConfig};
///
/// let config = TraceConfig::new()
///     .trace_all_requests(true)
///     .traced_attributes(["path", "method"])
///     .on_request_start(|span, _request| {
///         use opentelemetry::trace::Span;
///         span.set_attribute(opentelemetry::KeyValue::new("env", "prod"));
///         HookOutcome::Continue
///     });
/// ```
///
/// [`RequestTracer`]: crate::RequestTracer
#[derive(Default)]
pub struct TraceConfig {
    pub(crate) trace_all_requests: bool,
    pub(crate) traced_attributes: Vec<String>,
    pub(crate) source: TracerSource,
    pub(crate) set_global_tracer: bool,
    pub(crate) start_hook: Option<StartHook>,
    pub(crate) finish_hook: Option<FinishHook>,
}

impl TraceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace every request passing through the middleware.
    ///
    /// When off (the default), only handlers wrapped by [`TracedLayer`] are
    /// traced.
    ///
    /// [`TracedLayer`]: crate::trace::TracedLayer
    pub fn trace_all_requests(mut self, trace_all: bool) -> Self {
        self.trace_all_requests = trace_all;
        self
    }

    /// Request attributes copied onto every span as string tags, when
    /// present and non-empty.
    ///
    /// Well-known names (`method`, `path`, `query`, `url`, `host`, `scheme`,
    /// `version`, `remote-addr`) resolve from the request line; anything else
    /// resolves from the equally named request header.
    pub fn traced_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.traced_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Use this tracer instance. Takes precedence over a factory.
    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.source = TracerSource::Provided(tracer);
        self
    }

    /// Build the tracer from a constructor and its parameters, only consulted
    /// when no explicit tracer was supplied.
    pub fn with_tracer_factory(mut self, factory: TracerFactory) -> Self {
        if !matches!(self.source, TracerSource::Provided(_)) {
            self.source = TracerSource::Factory(factory);
        }
        self
    }

    /// Also install the tracer as the process-wide default at construction.
    pub fn set_global_tracer(mut self, set_global: bool) -> Self {
        self.set_global_tracer = set_global;
        self
    }

    /// Hook invoked after a request span is started and tagged.
    ///
    /// Returning [`HookOutcome::Suppress`] skips the default registration:
    /// the hook owns the span from then on and the request finishes without
    /// touching it.
    pub fn on_request_start(
        mut self,
        hook: impl for<'a> Fn(&mut BoxedSpan, &RequestHead<'a>) -> HookOutcome
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.start_hook = Some(Arc::new(hook));
        self
    }

    /// Hook invoked before a request span is finished.
    ///
    /// Returning [`HookOutcome::Suppress`] skips the default close; the hook
    /// is then responsible for ending the span.
    pub fn on_request_finish(
        mut self,
        hook: impl for<'a, 'b> Fn(&mut BoxedSpan, &'a RequestOutcome<'b>) -> HookOutcome
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.finish_hook = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceConfig")
            .field("trace_all_requests", &self.trace_all_requests)
            .field("traced_attributes", &self.traced_attributes)
            .field("source", &self.source)
            .field("set_global_tracer", &self.set_global_tracer)
            .field("start_hook", &self.start_hook.is_some())
            .field("finish_hook", &self.finish_hook.is_some())
            .finish()
    }
}
