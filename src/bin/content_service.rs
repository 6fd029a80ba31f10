use anyhow::Context;
use clap::Parser;
use event_pipeline::{
    api::{build_content_router, ContentState},
    cli::ServiceArgs,
    config::ServiceRole,
    content::ContentCatalog,
    messaging::{create_producer, init_pipeline_metrics, EventPublisher, RetryPolicy},
    telemetry::{init_tracing, shutdown_signal},
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();
    let config = args
        .load_config(ServiceRole::Content)
        .context("Failed to load configuration")?;

    init_tracing(&config.observability);

    tracing::info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.service.environment,
        "Starting content service"
    );

    if config.observability.prometheus_enabled {
        init_pipeline_metrics();
        tracing::info!("Prometheus metrics initialized");
    }

    let publisher = Arc::new(
        EventPublisher::new(
            create_producer(&config.messaging),
            config.service.name.clone(),
            config.messaging.topic.clone(),
        )
        .with_environment(config.service.environment.clone())
        .with_retry_policy(RetryPolicy::fixed(config.messaging.retry_delay())),
    );
    publisher.start();

    let state = ContentState::new(
        config.service.name.clone(),
        ContentCatalog::with_samples(),
        publisher.clone(),
    );
    let app = build_content_router(state);

    let http_addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!("HTTP API listening on http://{}", http_addr);
    tracing::info!("   Content: http://{}/content", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down gracefully...");
    publisher
        .shutdown(Duration::from_millis(config.server.shutdown_timeout_ms))
        .await;
    Ok(())
}
