//! Table of active spans, one entry per in-flight request.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use opentelemetry::global::BoxedSpan;
use opentelemetry::trace::{Span, SpanContext};
use opentelemetry::KeyValue;
use uuid::Uuid;

/// Opaque identifier bound to a single in-flight request.
///
/// Generated when the request span is started and stored in the request
/// [`Extensions`], so the span can be looked up later without relying on the
/// identity of the request value itself.
///
/// [`Extensions`]: http::Extensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared reference to a registered span.
///
/// The span itself is owned by the tracing client; the handle only mediates
/// access so the request handler and the interceptor can both reach it. The
/// handle never finishes the span, that is the interceptor's job.
#[derive(Clone)]
pub struct SpanHandle {
    span: Arc<Mutex<BoxedSpan>>,
}

impl SpanHandle {
    fn new(span: BoxedSpan) -> Self {
        Self {
            span: Arc::new(Mutex::new(span)),
        }
    }

    /// Run `f` with exclusive access to the underlying span.
    pub fn with<R>(&self, f: impl FnOnce(&mut BoxedSpan) -> R) -> R {
        let mut span = self.span.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut span)
    }

    /// Set a single tag on the span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.with(|span| span.set_attribute(attribute));
    }

    /// Record a timestamped event on the span.
    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.with(|span| span.add_event(name, attributes));
    }

    /// The span's wire identity, usable for injection.
    pub fn span_context(&self) -> SpanContext {
        self.with(|span| span.span_context().clone())
    }

    pub(crate) fn end(&self) {
        self.with(Span::end);
    }
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandle").finish_non_exhaustive()
    }
}

/// Request-scoped span table.
///
/// Keys are unique per in-flight request, so distinct requests never contend
/// on the same entry; the map still has to tolerate concurrent structural
/// mutation from different requests.
#[derive(Debug, Default)]
pub(crate) struct SpanRegistry {
    spans: DashMap<RequestId, SpanHandle>,
}

impl SpanRegistry {
    pub(crate) fn insert(&self, id: RequestId, span: BoxedSpan) -> SpanHandle {
        let handle = SpanHandle::new(span);
        self.spans.insert(id, handle.clone());
        handle
    }

    pub(crate) fn get(&self, id: RequestId) -> Option<SpanHandle> {
        self.spans.get(&id).map(|entry| entry.value().clone())
    }

    /// Remove and return the entry, making the companion finish operation
    /// idempotent by construction.
    pub(crate) fn remove(&self, id: RequestId) -> Option<SpanHandle> {
        self.spans.remove(&id).map(|(_, handle)| handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }
}
