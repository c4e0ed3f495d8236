//! Configuration management for the Provisio CLI.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

use provisio_common::LogFormat;
use provisio_proxmox::SettingsBag;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hypervisor API connection
    pub hypervisor: HypervisorConfig,
    /// Product settings keyed by product id
    pub products: BTreeMap<u64, BTreeMap<String, Value>>,
    /// Service state persistence
    pub state: StateConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.json_logs {
            self.logging.format = LogFormat::Json;
        }

        if let Some(ref state) = args.state {
            self.state.path = state.clone();
        }

        self
    }

    /// Connection settings in the bag form the extension consumes.
    pub fn connection_bag(&self) -> SettingsBag {
        let hv = &self.hypervisor;
        let mut bag = SettingsBag::new();
        bag.insert("host".into(), hv.host.clone());
        bag.insert("port".into(), hv.port.to_string());
        bag.insert("username".into(), hv.token_id.clone());
        bag.insert("password".into(), hv.token_secret.clone());
        bag.insert("verify_tls".into(), if hv.verify_tls { "1" } else { "0" }.into());
        bag
    }

    /// Settings bag of a configured product.
    pub fn product_bag(&self, product_id: u64) -> Result<SettingsBag> {
        let settings = self
            .products
            .get(&product_id)
            .with_context(|| format!("Product {} is not configured", product_id))?;

        let mut bag = SettingsBag::new();
        for (key, value) in settings {
            if let Some(text) = scalar_text(value)
                .with_context(|| format!("Product {}: setting '{}' must be a scalar or a list", product_id, key))?
            {
                bag.insert(key.clone(), text);
            }
        }
        Ok(bag)
    }
}

/// Render a YAML value the way settings bags store it.
///
/// Lists are joined with commas (`ips`); `null` means unset.
fn scalar_text(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::Bool(b) => Some(Some(if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::String(s) => Some(Some(s.clone())),
        Value::Sequence(items) => {
            let parts: Option<Vec<String>> = items
                .iter()
                .map(|item| scalar_text(item).flatten())
                .collect();
            parts.map(|p| Some(p.join(",")))
        }
        _ => None,
    }
}

/// Hypervisor API connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    pub host: String,
    pub port: u16,
    /// API token id, e.g. `root@pam!provisio`
    pub token_id: String,
    pub token_secret: String,
    pub verify_tls: bool,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8006,
            token_id: String::new(),
            token_secret: String::new(),
            verify_tls: false,
        }
    }
}

/// Service state persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding service records
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/provisio/services.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
