// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::warn;
use serde::Deserialize;

use crate::docker::{DEFAULT_API_VERSION, DEFAULT_ENDPOINT_HOST};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/resource-metadata.yaml";
const ENV_PREFIX: &str = "DD_RESOURCE_METADATA_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub log_level: String,
    pub docker_updater_interval_seconds: f64,
    pub docker_endpoint_host: String,
    pub docker_api_version: String,
    pub metadata_server_url: String,
    /// Pins the numeric project id instead of asking the metadata server.
    pub project_id: Option<String>,
    /// Pins the instance zone instead of asking the metadata server.
    pub zone: Option<String>,
    pub request_timeout_seconds: f64,
    pub api_socket: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            docker_updater_interval_seconds: 60.0,
            docker_endpoint_host: DEFAULT_ENDPOINT_HOST.to_string(),
            docker_api_version: DEFAULT_API_VERSION.to_string(),
            metadata_server_url: "http://metadata.google.internal/computeMetadata/v1/".to_string(),
            project_id: None,
            zone: None,
            request_timeout_seconds: 10.0,
            api_socket: PathBuf::from("/opt/datadog-agent/run/resource-metadata.sock"),
        }
    }
}

impl AgentConfig {
    pub fn polling_period(&self) -> Result<Duration> {
        positive_duration(
            "docker_updater_interval_seconds",
            self.docker_updater_interval_seconds,
        )
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        positive_duration("request_timeout_seconds", self.request_timeout_seconds)
    }

    /// Log level, honoring `DD_LOG_LEVEL` then `LOG_LEVEL` over the file.
    pub fn log_level(&self) -> log::Level {
        env::var("DD_LOG_LEVEL")
            .or_else(|_| env::var("LOG_LEVEL"))
            .map(|level| parse_log_level(&level))
            .unwrap_or_else(|_| parse_log_level(&self.log_level))
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("LOG_LEVEL", &mut self.log_level);
        override_from_env(
            "DOCKER_UPDATER_INTERVAL_SECONDS",
            &mut self.docker_updater_interval_seconds,
        );
        override_from_env("DOCKER_ENDPOINT_HOST", &mut self.docker_endpoint_host);
        override_from_env("DOCKER_API_VERSION", &mut self.docker_api_version);
        override_from_env("METADATA_SERVER_URL", &mut self.metadata_server_url);
        override_from_env("REQUEST_TIMEOUT_SECONDS", &mut self.request_timeout_seconds);
        override_from_env("API_SOCKET", &mut self.api_socket);
        if let Ok(project_id) = env::var(format!("{ENV_PREFIX}PROJECT_ID")) {
            self.project_id = Some(project_id);
        }
        if let Ok(zone) = env::var(format!("{ENV_PREFIX}ZONE")) {
            self.zone = Some(zone);
        }
    }
}

/// Loads the YAML config file if it exists, then applies environment overrides.
pub fn load_config(config_path: Option<&Path>) -> Result<AgentConfig> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if contents.trim().is_empty() {
            AgentConfig::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        }
    } else {
        warn!(
            "Config file not found at {}. Using defaults and environment variables.",
            path.display()
        );
        AgentConfig::default()
    };

    config.apply_env_overrides();
    config.polling_period()?;
    config.request_timeout()?;
    Ok(config)
}

fn override_from_env<T: FromStr>(key: &str, target: &mut T) {
    let var = format!("{ENV_PREFIX}{key}");
    let Ok(raw) = env::var(&var) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("ignoring invalid value {raw:?} for {var}"),
    }
}

fn positive_duration(name: &str, seconds: f64) -> Result<Duration> {
    if !(seconds > 0.0) {
        bail!("{name} must be greater than zero, got {seconds}");
    }
    Duration::try_from_secs_f64(seconds).with_context(|| format!("{name} is out of range"))
}

/// Parse a Go log level string into a log::Level
/// Unknown levels silently default to Info
fn parse_log_level(level: &str) -> log::Level {
    match level.to_lowercase().as_str() {
        "trace" => log::Level::Trace,
        "debug" => log::Level::Debug,
        "info" => log::Level::Info,
        "warn" | "warning" => log::Level::Warn,
        "error" | "critical" | "off" => log::Level::Error,
        _ => log::Level::Info,
    }
}
