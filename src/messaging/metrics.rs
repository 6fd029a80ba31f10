//! Prometheus metrics for the event pipeline

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};

/// Pipeline metrics
pub struct PipelineMetrics {
    /// Events accepted by the broker
    pub events_published: CounterVec,

    /// Events dropped by the publisher, by reason
    pub publish_drops: CounterVec,

    /// Messages ingested into the event log
    pub messages_consumed: CounterVec,

    /// Messages skipped because their payload was not a valid event
    pub messages_skipped: CounterVec,

    /// Connection state per role (0 disconnected, 1 connecting, 2 connected, 3 reconnecting)
    pub connection_state: GaugeVec,

    /// Connection attempts per role
    pub connection_attempts: CounterVec,
}

lazy_static! {
    pub static ref PIPELINE_METRICS: PipelineMetrics = PipelineMetrics {
        events_published: register_counter_vec!(
            "pipeline_events_published_total",
            "Total number of events accepted by the broker",
            &["topic"]
        )
        .unwrap(),

        publish_drops: register_counter_vec!(
            "pipeline_publish_drops_total",
            "Total number of events dropped by the publisher",
            &["topic", "reason"]
        )
        .unwrap(),

        messages_consumed: register_counter_vec!(
            "pipeline_messages_consumed_total",
            "Total number of messages ingested into the event log",
            &["topic"]
        )
        .unwrap(),

        messages_skipped: register_counter_vec!(
            "pipeline_messages_skipped_total",
            "Total number of malformed messages skipped",
            &["topic"]
        )
        .unwrap(),

        connection_state: register_gauge_vec!(
            "pipeline_connection_state",
            "Broker connection state per role",
            &["role"]
        )
        .unwrap(),

        connection_attempts: register_counter_vec!(
            "pipeline_connection_attempts_total",
            "Total number of broker connection attempts",
            &["role"]
        )
        .unwrap(),
    };
}

/// Initialize pipeline metrics
pub fn init_pipeline_metrics() {
    lazy_static::initialize(&PIPELINE_METRICS);
}

/// Render the default registry in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
