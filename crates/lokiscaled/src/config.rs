//! lokiscaled.toml configuration parser.
//!
//! ```toml
//! namespace = "apps"
//! secrets_dir = "/var/run/secrets/lokiscale"
//!
//! [[triggers]]
//! name = "api-errors"
//! metric_type = "AverageValue"
//!
//! [triggers.metadata]
//! serverAddress = "http://loki:3100"
//! query = 'sum(rate({app="api"} |= "error" [1m]))'
//! metricName = "api-errors"
//! threshold = "5"
//! authModes = "basic"
//!
//! [triggers.auth_params]
//! username = "reader"
//!
//! [triggers.secret_manager]
//! identity_provider = "gcp"
//! project_id = "acme"
//! secrets = [{ parameter = "password", id = "loki-password" }]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use lokiscale_core::MetricTargetType;
use lokiscale_scaler::ScalerConfig;
use lokiscale_secrets::SecretManagerSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Scopes secret lookups for every trigger.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Root of the file-backed secret lookup.
    pub secrets_dir: Option<PathBuf>,
    /// Overrides the secret store endpoint (tests, private endpoints).
    pub secret_manager_endpoint: Option<String>,
    /// Disable certificate checks for the secret store and token endpoints.
    #[serde(default)]
    pub secret_manager_insecure_tls: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub metric_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    pub secret_manager: Option<SecretManagerSpec>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        content
            .parse()
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// At least one trigger, names unique and non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.triggers.is_empty() {
            bail!("no triggers configured");
        }
        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            if trigger.name.trim().is_empty() {
                bail!("trigger name must not be empty");
            }
            if !seen.insert(trigger.name.as_str()) {
                bail!("duplicate trigger name {:?}", trigger.name);
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for DaemonConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: DaemonConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl TriggerConfig {
    /// Scaler configuration for the trigger at `index`.
    pub fn scaler_config(&self, index: usize, namespace: &str) -> anyhow::Result<ScalerConfig> {
        let metric_type = match self.metric_type.as_deref() {
            Some(t) => t
                .parse::<MetricTargetType>()
                .with_context(|| format!("trigger {}", self.name))?,
            None => MetricTargetType::default(),
        };
        Ok(ScalerConfig {
            trigger_metadata: self.metadata.clone(),
            auth_params: self.auth_params.clone(),
            scaler_index: index,
            namespace: namespace.to_string(),
            metric_type,
        })
    }
}
