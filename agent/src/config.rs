//! fwagent configuration loading
//!
//! Built once in `main` from an optional TOML file, then overridden by the
//! environment variables the agent has always honoured.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/fwagent/config.toml";
const CONFIG_PATH_ENV: &str = "FWAGENT_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(default)]
    pub token: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            controller_url: default_controller_url(),
            token: String::new(),
        }
    }
}

/// How the rule executor reaches the packet filter
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_iptables_bin")]
    pub iptables_bin: String,
    #[serde(default = "default_save_bin")]
    pub save_bin: String,
    #[serde(default = "default_true")]
    pub use_sudo: bool,
    /// Where `iptables-save` output is written. Unset means the tool is only invoked.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            iptables_bin: default_iptables_bin(),
            save_bin: default_save_bin(),
            use_sudo: true,
            save_path: None,
        }
    }
}

fn default_name() -> String { "default-agent".into() }
fn default_host() -> String { "localhost".into() }
fn default_port() -> u16 { 8001 }
fn default_controller_url() -> String { "http://localhost:8000".into() }
fn default_iptables_bin() -> String { "iptables".into() }
fn default_save_bin() -> String { "iptables-save".into() }
fn default_true() -> bool { true }

impl AgentConfig {
    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.agent.host, self.agent.port)
    }

    /// Apply `CONTROLLER_URL`, `AGENT_HOST`, `AGENT_PORT`, `AGENT_NAME` and
    /// `AGENT_TOKEN` on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CONTROLLER_URL") {
            self.agent.controller_url = url;
        }
        if let Some(host) = lookup("AGENT_HOST") {
            self.agent.host = host;
        }
        if let Some(port) = lookup("AGENT_PORT") {
            self.agent.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid AGENT_PORT: {port}"))?;
        }
        if let Some(name) = lookup("AGENT_NAME") {
            self.agent.name = name;
        }
        if let Some(token) = lookup("AGENT_TOKEN") {
            self.agent.token = token;
        }
        Ok(())
    }
}

/// Read a config file, falling back to defaults when it does not exist
pub fn load_from_path(path: &Path) -> Result<AgentConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path.display());
        Ok(AgentConfig::default())
    }
}

/// Load configuration from `$FWAGENT_CONFIG` (or /etc/fwagent/config.toml) plus environment
pub fn load_config() -> Result<AgentConfig> {
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = load_from_path(Path::new(&config_path))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}
