//! Request-scoped OpenTelemetry tracing for [`tower`] services.
//!
//! This crate glues a service's request/response lifecycle to the span
//! lifecycle of an OpenTelemetry tracer. A [`RequestTracer`] decides per
//! request whether to trace, extracts the parent context from the incoming
//! headers (falling back to a root span when there is none or it is
//! unusable), keeps the span discoverable while the handler runs, and
//! finishes it exactly once when the request completes, successfully or not.
//!
//! Two tracing modes are available:
//!
//! - blanket, via [`trace::HttpLayer`], tracing every request when the
//!   configuration enables [`trace_all_requests`];
//! - selective, via [`trace::TracedLayer`], wrapping individual handlers
//!   when blanket tracing is off.
//!
//! ```
//! use tower_request_trace::{RequestTracer, TraceConfig};
//!
//! let tracer = RequestTracer::new(
//!     TraceConfig::new()
//!         .trace_all_requests(true)
//!         .traced_attributes(["path", "method"]),
//! );
//! let layer = tracer.layer();
//! // tower::ServiceBuilder::new().layer(layer)...
//! ```
//!
//! Inside a handler the current span is reachable through the request:
//!
//! ```
//! use http::Request;
//! use opentelemetry::KeyValue;
//! use tower_request_trace::RequestTracer;
//!
//! fn handle(tracer: &RequestTracer, req: &Request<()>) {
//!     if let Some(span) = tracer.span(req) {
//!         span.set_attribute(KeyValue::new("order.count", 3i64));
//!     }
//! }
//! ```
//!
//! [`tower`]: https://crates.io/crates/tower
//! [`trace_all_requests`]: TraceConfig::trace_all_requests

pub use self::config::TraceConfig;
pub use self::error::ExtractError;
pub use self::hooks::{FinishHook, HookOutcome, StartHook};
pub use self::registry::{RequestId, SpanHandle};
pub use self::system::{TracerFactory, TracerParameters, TracerSource, TracingSystem};
pub use self::tracer::{RequestHead, RequestOutcome, RequestTracer};

pub mod config;
pub mod error;
pub mod global;
mod hooks;
mod registry;
mod system;
pub mod trace;
mod tracer;
mod util;
