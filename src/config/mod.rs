// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "EMULATOR";

/// Resolve the configuration from `EMULATOR_*` environment variables.
pub fn load_config() -> Result<EmulatorConfig> {
    load_config_from(None)
}

/// Same as [`load_config`], reading from `vars` instead of the process
/// environment when given. Keys use the full variable name, e.g. `EMULATOR_HOST`.
pub fn load_config_from(vars: Option<HashMap<String, String>>) -> Result<EmulatorConfig> {
    let raw: RawSettings = config::Config::builder()
        .add_source(config::Environment::with_prefix(ENV_PREFIX).source(vars))
        .build()
        .context("Failed to read emulator settings from the environment")?
        .try_deserialize()
        .context("Failed to parse emulator settings")?;

    Ok(resolve(raw))
}

fn resolve(raw: RawSettings) -> EmulatorConfig {
    let mut config = EmulatorConfig::default();

    if let Some(host) = non_empty(raw.host) {
        config.host = host;
    }
    if let Some(port) = parse_or_warn::<u16>("EMULATOR_HTTP_PORT", raw.http_port) {
        config.http_port = port;
    }
    if let Some(port) = parse_or_warn::<u16>("EMULATOR_AMQP_PORT", raw.amqp_port) {
        config.amqp_port = port;
    }
    if let Some(secs) = parse_or_warn::<u64>("EMULATOR_HEALTH_TIMEOUT_SECS", raw.health_timeout_secs) {
        config.health_deadline = Some(Duration::from_secs(secs));
    }

    config
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: Option<String>) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let value = non_empty(value)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", name, value, e);
            None
        }
    }
}
