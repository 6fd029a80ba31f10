use crate::api::{handlers, AnalyticsState, ContentState};
use axum::{routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the analytics service router
pub fn build_analytics_router(state: AnalyticsState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::analytics_health))
        // Event log
        .route("/events", get(handlers::list_events).post(handlers::ingest_event))
        .route("/stats", get(handlers::event_stats))
        // Broker status
        .route("/kafka-status", get(handlers::consumer_status))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

/// Build the content service router
pub fn build_content_router(state: ContentState) -> Router {
    Router::new()
        .route("/health", get(handlers::content_health))
        .route("/content", get(handlers::list_content).post(handlers::create_content))
        .route(
            "/content/:id",
            get(handlers::get_content).delete(handlers::delete_content),
        )
        .route("/kafka-status", get(handlers::publisher_status))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
