use std::convert::Infallible;
use std::fmt;

use http::{HeaderMap, Request, Response, StatusCode};
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{
    SpanContext, SpanId, Status, TraceContextExt, TraceFlags, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, Value};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tower::{service_fn, ServiceBuilder, ServiceExt};
use tower_request_trace::trace::HeaderInjector;
use tower_request_trace::{HookOutcome, RequestOutcome, RequestTracer, TraceConfig};

#[derive(Debug)]
struct HandlerError(&'static str);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// In-memory pipeline: every finished span lands in the returned exporter.
fn setup() -> (InMemorySpanExporter, SdkTracerProvider, TraceConfig) {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = BoxedTracer::new(Box::new(provider.tracer("http-tests")));
    (exporter, provider, TraceConfig::new().with_tracer(tracer))
}

fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| &kv.value)
}

fn ok_response() -> Response<()> {
    Response::builder().status(StatusCode::OK).body(()).unwrap()
}

#[tokio::test]
async fn blanket_tracing_spans_the_request_lifecycle() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true));

    let handler_tracer = tracer.clone();
    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(move |req: Request<()>| {
            let tracer = handler_tracer.clone();
            async move {
                let span = tracer.span(&req).expect("span visible during handling");
                span.set_attribute(KeyValue::new("handled", true));
                Ok::<_, Infallible>(ok_response())
            }
        }));

    let request = Request::builder().uri("/hello?lang=en").body(()).unwrap();
    let response = svc.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(tracer.active_spans(), 0);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "/hello");
    assert_eq!(attribute(span, "handled"), Some(&Value::Bool(true)));
    assert_eq!(
        attribute(span, "component"),
        Some(&Value::from("tower-request-trace"))
    );
    assert_eq!(
        attribute(span, "http.request.method"),
        Some(&Value::from("GET"))
    );
    assert_eq!(attribute(span, "url.query"), Some(&Value::from("lang=en")));
    assert_eq!(
        attribute(span, "http.response.status_code"),
        Some(&Value::I64(200))
    );
}

#[tokio::test]
async fn nothing_is_traced_when_blanket_tracing_is_off() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config);

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));

    let response = svc
        .oneshot(Request::builder().uri("/quiet").body(()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(tracer.active_spans(), 0);
    assert!(exporter.get_finished_spans().unwrap().is_empty());
}

#[tokio::test]
async fn failing_handler_finishes_an_errored_span() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true));

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Err::<Response<()>, _>(HandlerError("value out of range"))
        }));

    let result = svc
        .oneshot(Request::builder().uri("/fail").body(()).unwrap())
        .await;

    let error = result.expect_err("handler error must propagate");
    assert_eq!(error.to_string(), "value out of range");
    assert_eq!(tracer.active_spans(), 0);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(attribute(span, "error"), Some(&Value::Bool(true)));
    assert!(matches!(span.status, Status::Error { .. }));

    assert_eq!(span.events.len(), 1);
    let event = &span.events[0];
    assert_eq!(event.name, "error");
    assert!(event
        .attributes
        .iter()
        .any(|kv| kv.key.as_str() == "error.object"
            && kv.value == Value::from("value out of range")));
}

#[test]
fn finishing_twice_exports_a_single_span() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config);

    let mut request = Request::builder().uri("/once").body(()).unwrap();
    let id = tracer.start_request(&mut request, "once").expect("traced");

    assert!(tracer.finish_request(id, RequestOutcome::Response(StatusCode::OK)));
    assert!(!tracer.finish_request(id, RequestOutcome::Response(StatusCode::OK)));
    assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
}

#[tokio::test]
async fn continues_the_trace_from_an_injected_parent() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true));

    let trace_id = TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap();
    let parent_span_id = SpanId::from_hex("b7ad6b7169203331").unwrap();
    let parent = Context::new().with_remote_span_context(SpanContext::new(
        trace_id,
        parent_span_id,
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ));

    let mut request = Request::builder().uri("/child").body(()).unwrap();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&parent, &mut HeaderInjector(request.headers_mut()));
    });

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    svc.oneshot(request).await.unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].parent_span_id, parent_span_id);
    assert_eq!(spans[0].span_context.trace_id(), trace_id);
}

#[tokio::test]
async fn malformed_carrier_falls_back_to_a_root_span() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true));

    let request = Request::builder()
        .uri("/recover")
        .header("traceparent", "definitely-not-a-traceparent")
        .body(())
        .unwrap();

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    let response = svc.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
}

#[tokio::test]
async fn traced_attributes_are_copied_as_tags() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(
        config
            .trace_all_requests(true)
            .traced_attributes(["path", "method"]),
    );

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    svc.oneshot(Request::builder().uri("/foo").body(()).unwrap())
        .await
        .unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(attribute(&spans[0], "path"), Some(&Value::from("/foo")));
    assert_eq!(attribute(&spans[0], "method"), Some(&Value::from("GET")));
}

#[tokio::test]
async fn panicking_start_hook_does_not_break_the_request() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(
        config
            .trace_all_requests(true)
            .on_request_start(|_span, _head| panic!("misbehaving hook")),
    );

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    let response = svc
        .oneshot(Request::builder().uri("/sturdy").body(()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(tracer.active_spans(), 0);
    assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
}

#[tokio::test]
async fn finish_hook_can_take_over_closing() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true).on_request_finish(
        |span, _outcome| {
            use opentelemetry::trace::Span;
            span.set_attribute(KeyValue::new("closed.by", "hook"));
            span.end();
            HookOutcome::Suppress
        },
    ));

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    svc.oneshot(Request::builder().uri("/custom").body(()).unwrap())
        .await
        .unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(attribute(&spans[0], "closed.by"), Some(&Value::from("hook")));
}

#[tokio::test]
async fn wrapper_traces_a_single_handler_when_blanket_is_off() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config);

    let svc = ServiceBuilder::new()
        .layer(tracer.traced("checkout").with_attributes(["path"]))
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    svc.oneshot(Request::builder().uri("/cart/42").body(()).unwrap())
        .await
        .unwrap();

    assert_eq!(tracer.active_spans(), 0);
    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "checkout");
    assert_eq!(attribute(&spans[0], "path"), Some(&Value::from("/cart/42")));
}

#[tokio::test]
async fn wrapper_is_a_pass_through_under_blanket_tracing() {
    let (exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config.trace_all_requests(true));

    let svc = ServiceBuilder::new()
        .layer(tracer.layer())
        .layer(tracer.traced("checkout"))
        .service(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(ok_response())
        }));
    svc.oneshot(Request::builder().uri("/cart/42").body(()).unwrap())
        .await
        .unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "/cart/42");
}

#[test]
fn outgoing_headers_continue_the_trace() {
    let (_exporter, _provider, config) = setup();
    let tracer = RequestTracer::new(config);

    let mut request = Request::builder().uri("/relay").body(()).unwrap();
    let id = tracer.start_request(&mut request, "relay").expect("traced");
    let span_context = tracer.span_by_id(id).expect("registered").span_context();

    let mut outgoing = HeaderMap::new();
    tracer.inject_headers(id, &mut outgoing);

    let traceparent = outgoing
        .get("traceparent")
        .and_then(|value| value.to_str().ok())
        .expect("traceparent header injected");
    assert!(traceparent.contains(&span_context.trace_id().to_string()));

    tracer.finish_request(id, RequestOutcome::Response(StatusCode::OK));
}
