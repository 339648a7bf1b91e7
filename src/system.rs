//! The tracing system handle and the sources a tracer can be built from.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::noop::NoopTracer;

/// Parameters handed to a [`TracerFactory`] when the tracer is built.
pub type TracerParameters = HashMap<String, String>;

/// Deferred tracer constructor plus the parameters it is built with.
///
/// Used when the tracer cannot be constructed eagerly, for example because it
/// should only exist once a global system wins the installation race.
#[derive(Clone)]
pub struct TracerFactory {
    build: Arc<dyn Fn(&TracerParameters) -> BoxedTracer + Send + Sync>,
    parameters: TracerParameters,
}

impl TracerFactory {
    pub fn new(
        parameters: TracerParameters,
        build: impl Fn(&TracerParameters) -> BoxedTracer + Send + Sync + 'static,
    ) -> Self {
        Self {
            build: Arc::new(build),
            parameters,
        }
    }

    fn build(&self) -> BoxedTracer {
        (self.build)(&self.parameters)
    }
}

impl fmt::Debug for TracerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerFactory")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Where the tracer implementation comes from.
///
/// An explicitly supplied instance takes precedence over a factory, and a
/// no-op tracer is the fallback when neither is configured.
#[derive(Default)]
pub enum TracerSource {
    /// Use this tracer instance as-is.
    Provided(BoxedTracer),
    /// Build the tracer from a constructor and its parameters.
    Factory(TracerFactory),
    /// Trace nothing, at no cost.
    #[default]
    Noop,
}

impl fmt::Debug for TracerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provided(_) => f.write_str("Provided"),
            Self::Factory(factory) => factory.fmt(f),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

/// Handle to an initialized tracing setup.
///
/// A `TracingSystem` is an explicit value: build one, wrap it in an [`Arc`]
/// and share it with every interceptor that should use the same tracer. The
/// [`global`] module offers an optional process-wide slot for it.
///
/// [`global`]: crate::global
pub struct TracingSystem {
    tracer: BoxedTracer,
}

impl TracingSystem {
    pub fn new(source: TracerSource) -> Self {
        let tracer = match source {
            TracerSource::Provided(tracer) => tracer,
            TracerSource::Factory(factory) => factory.build(),
            TracerSource::Noop => BoxedTracer::new(Box::new(NoopTracer::new())),
        };
        Self { tracer }
    }

    pub fn tracer(&self) -> &BoxedTracer {
        &self.tracer
    }
}

impl fmt::Debug for TracingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingSystem").finish_non_exhaustive()
    }
}

impl Default for TracingSystem {
    fn default() -> Self {
        Self::new(TracerSource::Noop)
    }
}
