use crate::api::{AnalyticsState, ContentState};
use crate::content::{ContentItem, CreateContentRequest};
use crate::error::{AppError, Result};
use crate::messaging::{ConsumerStatus, EventPayload, IngestedEvent, PublisherStatus, StoredEvent};
use crate::state::{EventQuery, EventStats, QueryResult};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use validator::Validate;

/// `/health` body. Always 200; `kafka` only reports the broker link.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub kafka: &'static str,
}

// Analytics service

pub async fn analytics_health(State(state): State<AnalyticsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service.clone(),
        kafka: state.consumer.health().broker_label(),
    })
}

/// Most recent events, optionally filtered by `source` and `action`
pub async fn list_events(
    State(state): State<AnalyticsState>,
    query: std::result::Result<Query<EventQuery>, QueryRejection>,
) -> Result<Json<QueryResult>> {
    let Query(mut query) = query?;
    if query.limit.is_none() {
        query.limit = Some(state.default_limit);
    }

    let result = state.store.query(&query).await?;
    Ok(Json(result))
}

/// Append an event without going through the broker
pub async fn ingest_event(
    State(state): State<AnalyticsState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredEvent>)> {
    let Json(body) = body?;
    let payload = EventPayload::from_value(body)?;

    let stored = state.store.append(IngestedEvent::direct(payload)).await?;
    tracing::info!(
        event_id = %stored.id,
        source = %stored.source,
        action = %stored.action,
        "Event ingested directly"
    );

    Ok((StatusCode::CREATED, Json(stored)))
}

/// `/stats` body. `totalEvents` covers both ingestion paths; the message
/// counters only cover broker deliveries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: EventStats,
    pub messages_consumed: u64,
    pub messages_skipped: u64,
}

/// Lifetime counts per source and action, plus consumer totals
pub async fn event_stats(State(state): State<AnalyticsState>) -> Result<Json<StatsResponse>> {
    let stats = state.store.stats().await?;

    Ok(Json(StatsResponse {
        stats,
        messages_consumed: state.consumer.messages_consumed(),
        messages_skipped: state.consumer.messages_skipped(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatusResponse {
    pub connected: bool,
    #[serde(flatten)]
    pub consumer: ConsumerStatus,
    pub brokers: Vec<String>,
    pub client_id: String,
}

pub async fn consumer_status(State(state): State<AnalyticsState>) -> Result<Json<ConsumerStatusResponse>> {
    let consumer = state.consumer.status().await?;

    Ok(Json(ConsumerStatusResponse {
        connected: consumer.connection.state.is_connected(),
        consumer,
        brokers: state.brokers.clone(),
        client_id: state.client_id.clone(),
    }))
}

// Content service

pub async fn content_health(State(state): State<ContentState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service.clone(),
        kafka: state.publisher.health().broker_label(),
    })
}

#[derive(Debug, Serialize)]
pub struct ContentListResponse {
    pub items: Vec<ContentItem>,
    pub total: usize,
}

pub async fn list_content(State(state): State<ContentState>) -> Json<ContentListResponse> {
    let items = state.catalog.list();
    Json(ContentListResponse {
        total: items.len(),
        items,
    })
}

/// Get one item and publish a `view` event
pub async fn get_content(
    State(state): State<ContentState>,
    Path(id): Path<String>,
) -> Result<Json<ContentItem>> {
    let item = state
        .catalog
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("content {}", id)))?;

    publish(&state, "view", &item);
    Ok(Json(item))
}

pub async fn create_content(
    State(state): State<ContentState>,
    body: std::result::Result<Json<CreateContentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ContentItem>)> {
    let Json(request) = body?;
    request.validate()?;

    let item = state.catalog.create(request);
    tracing::info!(item_id = %item.id, "Content created");

    publish(&state, "create", &item);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn delete_content(
    State(state): State<ContentState>,
    Path(id): Path<String>,
) -> Result<Json<ContentItem>> {
    let item = state
        .catalog
        .delete(&id)
        .ok_or_else(|| AppError::NotFound(format!("content {}", id)))?;
    tracing::info!(item_id = %item.id, "Content deleted");

    publish(&state, "delete", &item);
    Ok(Json(item))
}

pub async fn publisher_status(State(state): State<ContentState>) -> Json<PublisherStatus> {
    Json(state.publisher.status())
}

// The response never waits on the broker; the outcome is logged by the publisher.
fn publish(state: &ContentState, action: &str, item: &ContentItem) {
    let mut extra = Map::new();
    extra.insert("title".to_string(), json!(item.title));

    drop(
        state
            .publisher
            .publish_detached(action, Some(item.id.clone()), extra),
    );
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    let metrics = crate::messaging::gather_metrics();
    (StatusCode::OK, metrics)
}
