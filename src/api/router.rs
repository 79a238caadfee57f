use std::time::Duration;

use axum::{
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::api::{attempts, catalog, handlers};
use crate::core::{config::Settings, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let api_v1 = Router::new()
        .nest("/exams", attempts::router())
        .nest("/catalog", catalog::router());

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&settings.api().api_v1_str, api_v1)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(trace_layer())
        .layer(build_cors_layer(settings));

    if settings.telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}

#[derive(Clone, Copy)]
struct ExamRequestSpan;

impl<B> MakeSpan<B> for ExamRequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id
        )
    }
}

#[derive(Clone, Copy)]
struct RecordRequestMetrics;

impl<B> OnResponse<B> for RecordRequestMetrics {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16().to_string();
        metrics::counter!("http_requests_total", "status" => status.clone()).increment(1);
        metrics::histogram!("http_request_duration_seconds", "status" => status)
            .record(latency.as_secs_f64());
    }
}

type ExamTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, ExamRequestSpan, DefaultOnRequest, RecordRequestMetrics>;

fn trace_layer() -> ExamTraceLayer {
    TraceLayer::new_for_http().make_span_with(ExamRequestSpan).on_response(RecordRequestMetrics)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, ORIGIN, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(3600));

    let origins: Vec<HeaderValue> = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        // Credentials cannot be combined with a wildcard origin.
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
    }
}
