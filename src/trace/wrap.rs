//! Selective tracing of individual handlers.

use std::borrow::Cow;
use std::fmt::Display;
use std::task::{Context, Poll};

use http::{Request, Response};
use tower_layer::Layer;
use tower_service::Service;

use super::http::ResponseFuture;
use crate::tracer::RequestTracer;

/// [`Layer`] that traces one wrapped handler under a fixed operation name.
///
/// This is the opt-in counterpart to blanket tracing: when the interceptor
/// is configured to trace all requests the wrapper is a transparent
/// pass-through, so a handler is never traced twice.
///
/// ```
/// use tower_request_trace::{RequestTracer, TraceConfig};
///
/// let tracer = RequestTracer::new(TraceConfig::new());
/// let layer = tracer.traced("checkout").with_attributes(["path"]);
/// ```
#[derive(Clone, Debug)]
pub struct TracedLayer {
    tracer: RequestTracer,
    operation: Cow<'static, str>,
    attributes: Vec<String>,
}

impl TracedLayer {
    pub fn new(tracer: RequestTracer, operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tracer,
            operation: operation.into(),
            attributes: Vec::new(),
        }
    }

    /// Request attributes copied onto this handler's spans as string tags.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

impl<S> Layer<S> for TracedLayer {
    type Service = Traced<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Traced {
            inner,
            tracer: self.tracer.clone(),
            operation: self.operation.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Middleware produced by [`TracedLayer`], wrapping a single handler.
///
/// The wrapped handler's response or error is propagated unchanged.
#[derive(Clone, Debug)]
pub struct Traced<S> {
    inner: S,
    tracer: RequestTracer,
    operation: Cow<'static, str>,
    attributes: Vec<String>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Traced<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let id = if self.tracer.trace_all_requests() {
            // the blanket middleware already traces this request
            None
        } else {
            self.tracer
                .start_request_with(&mut req, &self.operation, &self.attributes)
        };

        ResponseFuture::new(self.inner.call(req), self.tracer.clone(), id)
    }
}
