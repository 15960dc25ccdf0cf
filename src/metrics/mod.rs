/*!
 * # Metrics Module
 *
 * Prometheus counters for the order lifecycle, exposed in text format at
 * `/metrics`.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("Metrics output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

lazy_static! {
    pub static ref ORDERS_CREATED: IntCounter = register_int_counter!(
        "orders_created_total",
        "Total number of orders placed"
    )
    .expect("metric can be created");

    pub static ref ORDER_STATUS_UPDATES: IntCounter = register_int_counter!(
        "order_status_updates_total",
        "Total number of committed order status changes"
    )
    .expect("metric can be created");

    pub static ref ORDER_TRANSITION_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "order_transition_rejections_total",
        "Total number of rejected order mutations, by reason",
        &["kind"]
    )
    .expect("metric can be created");

    pub static ref AGENT_ASSIGNMENTS: IntCounter = register_int_counter!(
        "order_agent_assignments_total",
        "Total number of delivery agent assignments"
    )
    .expect("metric can be created");

    pub static ref EVENT_SEND_FAILURES: IntCounter = register_int_counter!(
        "order_event_send_failures_total",
        "Total number of domain events that could not be queued"
    )
    .expect("metric can be created");
}

pub fn record_rejection(kind: &str) {
    ORDER_TRANSITION_REJECTIONS.with_label_values(&[kind]).inc();
}

/// Gather all metrics and return them in Prometheus text format
pub fn gather_metrics() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        ORDERS_CREATED.inc();
        record_rejection("invalid_transition");

        let output = gather_metrics().unwrap();
        assert!(output.contains("orders_created_total"));
        assert!(output.contains("order_transition_rejections_total{kind=\"invalid_transition\"}"));
    }
}
