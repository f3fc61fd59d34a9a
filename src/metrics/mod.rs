pub mod prometheus_metrics;

pub use prometheus_metrics::{
    MetricsRegistry, metrics_handler, record_error, record_invalid_token, record_rate_limit_hit,
    record_session_issued, record_session_reused, record_session_revoked, record_stored_sessions,
    record_sweep,
};
