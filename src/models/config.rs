use crate::audit::AuditConfig;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// How the listener is secured. There is no default: plaintext must be chosen explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// Plaintext, for local development only
    Insecure,
    /// Plaintext listener behind a TLS-terminating proxy or mesh sidecar
    UpstreamTls,
}

impl std::str::FromStr for TransportSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insecure" => Ok(TransportSecurity::Insecure),
            "upstream_tls" => Ok(TransportSecurity::UpstreamTls),
            other => Err(format!("Unknown transport security mode '{}'", other)),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, e.g. "0.0.0.0:8081"
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Required; see `TransportSecurity`
    #[serde(default)]
    pub transport_security: Option<TransportSecurity>,
    /// Caller-side deadline for a single request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            transport_security: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.bind_address
            .parse()
            .map_err(|e| format!("Invalid server.bind_address '{}': {}", self.bind_address, e))
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.server.socket_addr()?;

        if self.server.transport_security.is_none() {
            return Err(
                "server.transport_security must be set explicitly (insecure or upstream_tls)"
                    .to_string(),
            );
        }

        if self.server.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs must be at least 1".to_string());
        }

        self.session.validate()?;
        self.rate_limit.validate()?;

        if self.audit.channel_capacity == 0 {
            return Err("audit.channel_capacity must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.transport_security = Some(TransportSecurity::Insecure);
        config.session.token_secret = "s".repeat(32);
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_transport_security_is_required() {
        let mut config = valid_config();
        config.server.transport_security = None;
        assert!(
            config
                .validate()
                .unwrap_err()
                .contains("transport_security")
        );
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let mut config = valid_config();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().unwrap_err().contains("bind_address"));
    }

    #[test]
    fn test_transport_security_from_str() {
        assert_eq!(
            "insecure".parse::<TransportSecurity>().unwrap(),
            TransportSecurity::Insecure
        );
        assert_eq!(
            "UPSTREAM_TLS".parse::<TransportSecurity>().unwrap(),
            TransportSecurity::UpstreamTls
        );
        assert!("tls".parse::<TransportSecurity>().is_err());
    }
}
