use anyhow::Context;
use clap::Parser;
use event_pipeline::{
    api::{build_analytics_router, AnalyticsState},
    cli::ServiceArgs,
    config::ServiceRole,
    messaging::{create_subscriber, init_pipeline_metrics, EventConsumer, RetryPolicy},
    state::{EventStore, InMemoryEventLog},
    telemetry::{init_tracing, shutdown_signal},
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();
    let config = args
        .load_config(ServiceRole::Analytics)
        .context("Failed to load configuration")?;

    init_tracing(&config.observability);

    tracing::info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.service.environment,
        "Starting analytics service"
    );

    if config.observability.prometheus_enabled {
        init_pipeline_metrics();
        tracing::info!("Prometheus metrics initialized");
    }

    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventLog::new());

    // Subscribe loop runs independently of the HTTP surface
    let consumer = Arc::new(
        EventConsumer::new(
            create_subscriber(&config.messaging),
            store.clone(),
            config.messaging.topic.clone(),
            config.messaging.kafka.group_id.clone(),
        )
        .with_retry_policy(RetryPolicy::fixed(config.messaging.retry_delay())),
    );
    consumer.start();

    let state = AnalyticsState::new(config.service.name.clone(), store, consumer.clone())
        .with_default_limit(config.query.default_limit)
        .with_broker_info(
            config.messaging.kafka.brokers(),
            config.messaging.kafka.client_id.clone(),
        );
    let app = build_analytics_router(state);

    let http_addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!("HTTP API listening on http://{}", http_addr);
    tracing::info!("   Events: http://{}/events", http_addr);
    tracing::info!("   Stats: http://{}/stats", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down gracefully...");
    consumer
        .shutdown(Duration::from_millis(config.server.shutdown_timeout_ms))
        .await;
    Ok(())
}
