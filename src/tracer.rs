//! The request tracing interceptor.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method, Request, StatusCode, Uri, Version};
use opentelemetry::trace::{Span, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};

use crate::config::TraceConfig;
use crate::global;
use crate::hooks::{self, FinishHook, HookOutcome, StartHook};
use crate::registry::{RequestId, SpanHandle, SpanRegistry};
use crate::system::TracingSystem;
use crate::trace::carrier::{Carrier, HeaderInjector};
use crate::trace::http::HttpLayer;
use crate::trace::wrap::TracedLayer;
use crate::util;

const COMPONENT: &str = "tower-request-trace";

/// Borrowed view of the request line and headers, handed to start hooks.
#[derive(Clone, Copy, Debug)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    pub(crate) fn from_request<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            uri: req.uri(),
            version: req.version(),
            headers: req.headers(),
        }
    }
}

/// How the request ended, as seen by the finish operation and finish hooks.
pub enum RequestOutcome<'a> {
    /// A response was produced with this status.
    Response(StatusCode),
    /// The handler failed with this error.
    Failure(&'a dyn fmt::Display),
}

impl fmt::Debug for RequestOutcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(status) => f.debug_tuple("Response").field(status).finish(),
            Self::Failure(error) => f.debug_tuple("Failure").field(&error.to_string()).finish(),
        }
    }
}

/// Request tracing interceptor.
///
/// Sits between a service's request-dispatch step and the wrapped handler:
/// it decides per request whether to trace, starts or joins a span from the
/// incoming headers, keeps it discoverable while the handler runs, and
/// finishes it exactly once when the request completes.
///
/// Cloning is cheap and every clone shares the same registry, so the layer,
/// the handler, and the application can all talk about the same spans.
#[derive(Clone)]
pub struct RequestTracer {
    inner: Arc<Inner>,
}

struct Inner {
    system: Arc<TracingSystem>,
    registry: SpanRegistry,
    trace_all_requests: bool,
    traced_attributes: Vec<String>,
    start_hook: Option<StartHook>,
    finish_hook: Option<FinishHook>,
}

impl RequestTracer {
    /// Build an interceptor from `config`.
    ///
    /// When the configuration asks for a global tracer, the process-wide
    /// [`TracingSystem`] slot is initialized from the configured source (the
    /// first initializer wins) and this interceptor uses whatever is
    /// installed.
    pub fn new(config: TraceConfig) -> Self {
        let TraceConfig {
            trace_all_requests,
            traced_attributes,
            source,
            set_global_tracer,
            start_hook,
            finish_hook,
        } = config;

        let system = if set_global_tracer {
            global::init_tracing(source)
        } else {
            Arc::new(TracingSystem::new(source))
        };

        Self {
            inner: Arc::new(Inner {
                system,
                registry: SpanRegistry::default(),
                trace_all_requests,
                traced_attributes,
                start_hook,
                finish_hook,
            }),
        }
    }

    /// Build an interceptor on an existing [`TracingSystem`] handle.
    ///
    /// The tracer source and global flag in `config` are ignored; the
    /// supplied handle is used as-is.
    pub fn with_system(system: Arc<TracingSystem>, config: TraceConfig) -> Self {
        let TraceConfig {
            trace_all_requests,
            traced_attributes,
            start_hook,
            finish_hook,
            ..
        } = config;

        Self {
            inner: Arc::new(Inner {
                system,
                registry: SpanRegistry::default(),
                trace_all_requests,
                traced_attributes,
                start_hook,
                finish_hook,
            }),
        }
    }

    /// Blanket middleware layer for this interceptor.
    pub fn layer(&self) -> HttpLayer {
        HttpLayer::new(self.clone())
    }

    /// Selective wrapper layer tracing one handler under `operation`.
    pub fn traced(&self, operation: impl Into<Cow<'static, str>>) -> TracedLayer {
        TracedLayer::new(self.clone(), operation)
    }

    pub fn trace_all_requests(&self) -> bool {
        self.inner.trace_all_requests
    }

    pub fn system(&self) -> &Arc<TracingSystem> {
        &self.inner.system
    }

    /// Number of spans currently registered, one per in-flight traced
    /// request.
    pub fn active_spans(&self) -> usize {
        self.inner.registry.len()
    }

    /// The identifier bound to `req`, if the request is being traced.
    pub fn request_id<B>(req: &Request<B>) -> Option<RequestId> {
        req.extensions().get::<RequestId>().copied()
    }

    /// The span tracing `req`, if any.
    pub fn span<B>(&self, req: &Request<B>) -> Option<SpanHandle> {
        Self::request_id(req).and_then(|id| self.span_by_id(id))
    }

    /// The span registered under `id`, if any.
    pub fn span_by_id(&self, id: RequestId) -> Option<SpanHandle> {
        self.inner.registry.get(id)
    }

    /// Start tracing `req` under `operation`, copying the configured traced
    /// attributes.
    ///
    /// Returns the identifier the span was registered under, also inserted
    /// into the request extensions. Returns `None` when a start hook took
    /// ownership of the span.
    pub fn start_request<B>(&self, req: &mut Request<B>, operation: &str) -> Option<RequestId> {
        self.start_request_with(req, operation, &self.inner.traced_attributes)
    }

    /// Start tracing `req` under `operation` with an explicit traced
    /// attribute list.
    ///
    /// The incoming headers are read as a carrier; when they carry a usable
    /// parent context the span joins it, otherwise a new root span is
    /// started. Extraction failures never escape.
    pub fn start_request_with<B>(
        &self,
        req: &mut Request<B>,
        operation: &str,
        attribute_names: &[String],
    ) -> Option<RequestId> {
        let parent = match Carrier::from_headers(req.headers()).extract() {
            Ok(parent) => parent,
            Err(error) => {
                tracing::debug!(%error, "trace context extraction failed, starting a root span");
                None
            }
        };

        let mut attributes = vec![
            KeyValue::new("component", COMPONENT),
            KeyValue::new("http.request.method", util::http_method(req.method())),
            KeyValue::new("url.path", req.uri().path().to_owned()),
        ];
        if let Some(query) = req.uri().query() {
            attributes.push(KeyValue::new("url.query", query.to_owned()));
        }
        if let Some(version) = util::http_version(req.version()) {
            attributes.push(KeyValue::new("network.protocol.version", version));
        }

        let tracer = self.inner.system.tracer();
        let builder = tracer
            .span_builder(operation.to_owned())
            .with_kind(SpanKind::Server)
            .with_attributes(attributes);
        let mut span = match parent {
            Some(parent) => builder.start_with_context(tracer, &parent),
            None => builder.start(tracer),
        };

        for name in attribute_names {
            if let Some(value) = util::request_attribute(&*req, name) {
                if !value.is_empty() {
                    span.set_attribute(KeyValue::new(name.clone(), value));
                }
            }
        }

        if let Some(hook) = &self.inner.start_hook {
            let head = RequestHead::from_request(&*req);
            if let HookOutcome::Suppress = hooks::run_start_hook(hook, &mut span, &head) {
                return None;
            }
        }

        let id = RequestId::new();
        req.extensions_mut().insert(id);
        self.inner.registry.insert(id, span);
        Some(id)
    }

    /// Finish the span registered under `id`.
    ///
    /// The entry is removed before the span is touched, so a second call for
    /// the same request (or a call for a request that was never traced) is a
    /// no-op; returns whether a span was finished. Failures tag the span as
    /// errored and record one `error` event before it is closed.
    pub fn finish_request(&self, id: RequestId, outcome: RequestOutcome<'_>) -> bool {
        let Some(handle) = self.inner.registry.remove(id) else {
            return false;
        };

        handle.with(|span| {
            match &outcome {
                RequestOutcome::Response(status) => {
                    span.set_attribute(KeyValue::new(
                        "http.response.status_code",
                        i64::from(status.as_u16()),
                    ));
                    if status.is_server_error() {
                        let reason = status.canonical_reason().unwrap_or("server error");
                        span.set_status(Status::error(reason.to_owned()));
                    }
                }
                RequestOutcome::Failure(error) => {
                    let message = error.to_string();
                    span.set_attribute(KeyValue::new("error", true));
                    span.add_event("error", vec![KeyValue::new("error.object", message.clone())]);
                    span.set_status(Status::error(message));
                }
            }

            if let Some(hook) = &self.inner.finish_hook {
                if let HookOutcome::Suppress = hooks::run_finish_hook(hook, span, &outcome) {
                    return;
                }
            }
            span.end();
        });
        true
    }

    /// Inject the span registered under `id` into an outgoing header map, so
    /// the trace continues across the wire.
    pub fn inject_headers(&self, id: RequestId, headers: &mut HeaderMap) {
        let Some(handle) = self.inner.registry.get(id) else {
            return;
        };
        let context = Context::new().with_remote_span_context(handle.span_context());
        opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&context, &mut HeaderInjector(headers));
        });
    }
}

impl fmt::Debug for RequestTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracer")
            .field("trace_all_requests", &self.inner.trace_all_requests)
            .field("traced_attributes", &self.inner.traced_attributes)
            .field("active_spans", &self.active_spans())
            .finish_non_exhaustive()
    }
}
