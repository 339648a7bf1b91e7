//! Blanket middleware tracing every request handled by a [`Service`].
//!
//! [`Service`]: tower_service::Service

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use http::{Request, Response};
use pin_project::pin_project;
use tower_layer::Layer;
use tower_service::Service;

use crate::registry::RequestId;
use crate::tracer::{RequestOutcome, RequestTracer};
use crate::util;

/// [`Layer`] that traces every request through a [`Service`].
///
/// The layer does nothing unless its [`RequestTracer`] is configured to
/// trace all requests; selective tracing goes through [`TracedLayer`]
/// instead.
///
/// [`Service`]: tower_service::Service
/// [`TracedLayer`]: super::TracedLayer
#[derive(Clone, Debug)]
pub struct HttpLayer {
    tracer: RequestTracer,
}

impl HttpLayer {
    pub fn new(tracer: RequestTracer) -> Self {
        Self { tracer }
    }
}

impl<S> Layer<S> for HttpLayer {
    type Service = Http<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Http {
            inner,
            tracer: self.tracer.clone(),
        }
    }
}

/// Middleware that traces every request through a [`Service`].
///
/// The span's operation name is the matched route template when one is
/// available, the URI path otherwise.
///
/// [`Service`]: tower_service::Service
#[derive(Clone, Debug)]
pub struct Http<S> {
    inner: S,
    tracer: RequestTracer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Http<S>
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
            let operation = util::http_route(&req)
                .unwrap_or_else(|| req.uri().path())
                .to_owned();
            self.tracer.start_request(&mut req, &operation)
        } else {
            None
        };

        ResponseFuture {
            inner: self.inner.call(req),
            tracer: self.tracer.clone(),
            id,
        }
    }
}

/// Response future for [`Http`] and [`Traced`].
///
/// Finishes the registered span when the inner future resolves, tagging it
/// from the response or the error; the inner result is forwarded unchanged.
///
/// [`Traced`]: super::Traced
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    inner: F,
    tracer: RequestTracer,
    id: Option<RequestId>,
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, tracer: RequestTracer, id: Option<RequestId>) -> Self {
        Self { inner, tracer, id }
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: Display,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match ready!(this.inner.poll(cx)) {
            Ok(response) => {
                if let Some(id) = this.id.take() {
                    this.tracer
                        .finish_request(id, RequestOutcome::Response(response.status()));
                }
                Poll::Ready(Ok(response))
            }
            Err(error) => {
                if let Some(id) = this.id.take() {
                    this.tracer
                        .finish_request(id, RequestOutcome::Failure(&error));
                }
                Poll::Ready(Err(error))
            }
        }
    }
}
