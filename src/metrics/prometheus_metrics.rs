use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}

pub struct MetricsRegistry {
    pub registry: Registry,

    // Session lifecycle
    pub sessions_issued_total: IntCounter,
    pub sessions_reused_total: IntCounter,
    pub sessions_revoked_total: IntCounterVec,
    pub sessions_swept_total: IntCounter,
    pub stored_sessions: IntGauge,
    pub sweep_duration_seconds: Histogram,

    // Rejections and errors
    pub rate_limit_hits_total: IntCounter,
    pub invalid_tokens_total: IntCounterVec,
    pub errors_total: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sessions_issued_total = IntCounter::new(
            "sessions_issued_total",
            "Total number of newly minted sessions",
        )
        .unwrap();

        let sessions_reused_total = IntCounter::new(
            "sessions_reused_total",
            "Total number of requests answered with an existing session",
        )
        .unwrap();

        let sessions_revoked_total = IntCounterVec::new(
            Opts::new("sessions_revoked_total", "Total number of revoked sessions"),
            &["reason"],
        )
        .unwrap();

        let sessions_swept_total = IntCounter::new(
            "sessions_swept_total",
            "Total number of expired sessions removed by the sweep",
        )
        .unwrap();

        let stored_sessions =
            IntGauge::new("stored_sessions", "Number of session records in the store").unwrap();

        let sweep_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("sweep_duration_seconds", "Sweep duration in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .unwrap();

        let rate_limit_hits_total = IntCounter::new(
            "rate_limit_hits_total",
            "Total number of issuance requests rejected by the rate limiter",
        )
        .unwrap();

        let invalid_tokens_total = IntCounterVec::new(
            Opts::new(
                "invalid_tokens_total",
                "Total number of tokens that failed integrity checks",
            ),
            &["operation"],
        )
        .unwrap();

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors returned to callers"),
            &["error_type", "operation"],
        )
        .unwrap();

        registry
            .register(Box::new(sessions_issued_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sessions_reused_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sessions_revoked_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sessions_swept_total.clone()))
            .unwrap();
        registry.register(Box::new(stored_sessions.clone())).unwrap();
        registry
            .register(Box::new(sweep_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(rate_limit_hits_total.clone()))
            .unwrap();
        registry
            .register(Box::new(invalid_tokens_total.clone()))
            .unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();

        Self {
            registry,
            sessions_issued_total,
            sessions_reused_total,
            sessions_revoked_total,
            sessions_swept_total,
            stored_sessions,
            sweep_duration_seconds,
            rate_limit_hits_total,
            invalid_tokens_total,
            errors_total,
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Convenience functions for common metrics operations

pub fn record_session_issued() {
    METRICS_REGISTRY.sessions_issued_total.inc();
}

pub fn record_session_reused() {
    METRICS_REGISTRY.sessions_reused_total.inc();
}

pub fn record_session_revoked(reason: &str) {
    METRICS_REGISTRY
        .sessions_revoked_total
        .with_label_values(&[reason])
        .inc();
}

pub fn record_sweep(removed: usize, duration_secs: f64) {
    METRICS_REGISTRY
        .sessions_swept_total
        .inc_by(removed as u64);
    METRICS_REGISTRY
        .sweep_duration_seconds
        .observe(duration_secs);
}

pub fn record_stored_sessions(count: usize) {
    METRICS_REGISTRY.stored_sessions.set(count as i64);
}

pub fn record_rate_limit_hit() {
    METRICS_REGISTRY.rate_limit_hits_total.inc();
}

pub fn record_invalid_token(operation: &str) {
    METRICS_REGISTRY
        .invalid_tokens_total
        .with_label_values(&[operation])
        .inc();
}

pub fn record_error(error_type: &str, operation: &str) {
    METRICS_REGISTRY
        .errors_total
        .with_label_values(&[error_type, operation])
        .inc();
}

/// Metrics handler for Prometheus
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS_REGISTRY.render() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            metrics,
        )
            .into_response(),
        Err(e) => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from(format!("Failed to render metrics: {}", e)))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.render().is_ok());
    }

    #[test]
    fn test_record_session_issued() {
        record_session_issued();
        record_session_issued();

        let metrics = METRICS_REGISTRY.render().unwrap();
        assert!(metrics.contains("sessions_issued_total"));
    }

    #[test]
    fn test_record_labelled_counters() {
        record_session_revoked("session_limit");
        record_invalid_token("revoke");
        record_error("internal", "get_session");

        let metrics = METRICS_REGISTRY.render().unwrap();
        assert!(metrics.contains("sessions_revoked_total{reason=\"session_limit\"}"));
        assert!(metrics.contains("invalid_tokens_total"));
        assert!(metrics.contains("errors_total"));
    }
}
