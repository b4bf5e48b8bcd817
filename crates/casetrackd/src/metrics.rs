//! Prometheus metrics for the API surface.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiMetrics {
    /// Requests by method, matched route and response status.
    pub http_requests_total: IntCounterVec,

    /// Intake submissions by outcome (created / appended / overwritten /
    /// rejected).
    pub intake_total: IntCounterVec,

    /// Automation gateway forwards that failed (and were swallowed).
    pub gateway_failures_total: IntCounter,

    registry: Arc<Registry>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = register_int_counter_vec_with_registry!(
            "casetrack_http_requests_total",
            "Total HTTP requests by method, route and status",
            &["method", "route", "status"],
            registry
        )
        .unwrap();

        let intake_total = register_int_counter_vec_with_registry!(
            "casetrack_intake_total",
            "Case intake submissions by outcome",
            &["outcome"],
            registry
        )
        .unwrap();

        let gateway_failures_total = register_int_counter_with_registry!(
            "casetrack_gateway_failures_total",
            "Automation gateway forwards that failed",
            registry
        )
        .unwrap();

        Self {
            http_requests_total,
            intake_total,
            gateway_failures_total,
            registry: Arc::new(registry),
        }
    }

    /// Text exposition format for the /metrics endpoint.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}
