use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation live here, decoupled from the process environment so
/// tests can drive it from a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_positive_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        match parse_u64(var, default)? {
            0 => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be at least 1".to_string(),
            }),
            n => Ok(n),
        }
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        match raw.parse::<usize>() {
            Ok(0) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be at least 1".to_string(),
            }),
            Ok(n) => Ok(n),
            Err(e) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        }
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("MEDLAKE_ENV", "development"));
    let log_level = or_default("MEDLAKE_LOG_LEVEL", "info");
    let channels_path = PathBuf::from(or_default(
        "MEDLAKE_CHANNELS_PATH",
        "./config/channels.yaml",
    ));
    let lake_root = PathBuf::from(or_default("MEDLAKE_LAKE_ROOT", "./data/raw"));

    let channel_api_url = or_default("MEDLAKE_CHANNEL_API_URL", "http://127.0.0.1:8081");
    let channel_api_token = lookup("MEDLAKE_CHANNEL_API_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    let collector_message_limit = parse_positive_usize("MEDLAKE_COLLECTOR_MESSAGE_LIMIT", "500")?;
    let collector_request_timeout_secs =
        parse_positive_u64("MEDLAKE_COLLECTOR_REQUEST_TIMEOUT_SECS", "30")?;
    let collector_user_agent = or_default(
        "MEDLAKE_COLLECTOR_USER_AGENT",
        "medlake/0.1 (channel-collector)",
    );

    let detector_url = or_default("MEDLAKE_DETECTOR_URL", "http://127.0.0.1:8090");
    let detector_timeout_secs = parse_positive_u64("MEDLAKE_DETECTOR_TIMEOUT_SECS", "60")?;

    let db_max_connections = parse_u32("MEDLAKE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MEDLAKE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MEDLAKE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let transform_dir = PathBuf::from(or_default("MEDLAKE_TRANSFORM_DIR", "./medical_warehouse"));
    let transform_command = or_default("MEDLAKE_TRANSFORM_COMMAND", "dbt");
    let schedule = or_default("MEDLAKE_SCHEDULE", "0 0 0 * * *");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        channels_path,
        lake_root,
        channel_api_url,
        channel_api_token,
        collector_message_limit,
        collector_request_timeout_secs,
        collector_user_agent,
        detector_url,
        detector_timeout_secs,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        transform_dir,
        transform_command,
        schedule,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
