// Library exports for the binary and integration tests
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod service;
pub mod session;
