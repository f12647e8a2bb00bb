use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use std::path::Path;

use super::AgentConfig;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Environment variable prefix; `__` separates sections
/// (`QUALITY_AGENT_RUNNER__CHECK_TIMEOUT_SECS=30`).
pub const ENV_PREFIX: &str = "QUALITY_AGENT_";

/// Load the layered configuration.
///
/// Priority, lowest first: embedded defaults, then either `custom_config` or
/// the `quality-agent.{toml,json,yaml,yml}` files in the working directory,
/// then environment variables.
pub fn load(custom_config: Option<&Path>) -> Result<AgentConfig> {
    load_from(figment(custom_config)?)
}

/// Extract and validate an [`AgentConfig`] from an assembled figment
pub fn load_from(figment: Figment) -> Result<AgentConfig> {
    let config: AgentConfig = figment
        .extract()
        .context("Failed to parse configuration")?;
    config.validate()?;

    tracing::trace!(?config, "Configuration loaded");
    Ok(config)
}

fn figment(custom_config: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

    if let Some(path) = custom_config {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => figment.merge(Json::file(path)),
            Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
    } else {
        figment = figment
            .merge(Toml::file("quality-agent.toml"))
            .merge(Json::file("quality-agent.json"))
            .merge(Yaml::file("quality-agent.yaml"))
            .merge(Yaml::file("quality-agent.yml"));
    }

    // Environment variables always have highest priority
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}
