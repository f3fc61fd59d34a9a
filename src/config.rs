use crate::models::{AppConfig, TransportSecurity};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Environment variables that override file values
pub const ENV_TOKEN_SECRET: &str = "CREDENTIALS_TOKEN_SECRET";
pub const ENV_BIND_ADDRESS: &str = "CREDENTIALS_BIND_ADDRESS";
pub const ENV_TRANSPORT_SECURITY: &str = "CREDENTIALS_TRANSPORT_SECURITY";

/// Parse configuration from YAML text without validating it
pub fn parse_config(contents: &str) -> Result<AppConfig, String> {
    serde_yaml::from_str(contents).map_err(|e| format!("Failed to parse YAML config: {}", e))
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let mut config = parse_config(&contents)?;
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    log_summary(&config);
    Ok(Arc::new(config))
}

/// Load configuration with fallback options.
///
/// Order: `CONFIG_PATH`, then `config.yaml`/`config.yml` in the working
/// directory, then defaults plus `CREDENTIALS_*` environment variables.
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    if let Ok(config_path) = std::env::var("CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["config.yaml", "config.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    warn!("No configuration file found, using defaults and environment variables");
    let mut config = AppConfig::default();
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate().map_err(|e| {
        format!(
            "{}. Create a config.yaml (see config.example.yaml), set CONFIG_PATH, or provide {} and {}",
            e, ENV_TOKEN_SECRET, ENV_TRANSPORT_SECURITY
        )
    })?;

    log_summary(&config);
    Ok(Arc::new(config))
}

/// Apply `CREDENTIALS_*` overrides using the given variable lookup
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(ENV_TOKEN_SECRET) {
        config.session.token_secret = secret;
    }

    if let Some(address) = lookup(ENV_BIND_ADDRESS) {
        config.server.bind_address = address;
    }

    if let Some(mode) = lookup(ENV_TRANSPORT_SECURITY) {
        config.server.transport_security = Some(mode.parse::<TransportSecurity>()?);
    }

    Ok(())
}

fn log_summary(config: &AppConfig) {
    info!(
        "Configuration loaded: bind={} transport={:?} ttl={}s max_sessions_per_user={} rate_limit={}/{}s",
        config.server.bind_address,
        config.server.transport_security,
        config.session.ttl_secs,
        config.session.max_sessions_per_user,
        config.rate_limit.max_issuances,
        config.rate_limit.window_secs
    );
}
