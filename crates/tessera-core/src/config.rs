//! tessera.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::features::FeatureSet;
use crate::timeouts::Timeouts;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub operator: OperatorSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub scaling: ScalingSection,
    /// Feature overrides by name, e.g. `graceful-shutdown = false`.
    #[serde(default)]
    pub features: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSection {
    /// Namespace to watch. `None` means the client's default namespace.
    pub namespace: Option<String>,
    /// Upper bound for the per-deployment requeue interval.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,
    /// How often the deployment list is refreshed.
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: String,
    /// Admin API listen address.
    #[serde(default = "default_api_listen")]
    pub api_listen: String,
    /// Cluster DNS domain appended to member DNS names, if any.
    pub cluster_domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_kubernetes_timeout")]
    pub kubernetes: String,
    #[serde(default = "default_database_timeout")]
    pub database: String,
    #[serde(default = "default_reconciliation_timeout")]
    pub reconciliation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingSection {
    /// Keep the database's own server-count view in sync with the spec.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional bearer token for the database admin endpoint.
    pub jwt: Option<String>,
}

fn default_reconcile_interval() -> String {
    "60s".to_string()
}

fn default_discovery_interval() -> String {
    "10s".to_string()
}

fn default_api_listen() -> String {
    "0.0.0.0:8528".to_string()
}

fn default_kubernetes_timeout() -> String {
    "2s".to_string()
}

fn default_database_timeout() -> String {
    "10s".to_string()
}

fn default_reconciliation_timeout() -> String {
    "1m".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OperatorSection {
    fn default() -> Self {
        Self {
            namespace: None,
            reconcile_interval: default_reconcile_interval(),
            discovery_interval: default_discovery_interval(),
            api_listen: default_api_listen(),
            cluster_domain: None,
        }
    }
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            kubernetes: default_kubernetes_timeout(),
            database: default_database_timeout(),
            reconciliation: default_reconciliation_timeout(),
        }
    }
}

impl Default for ScalingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt: None,
        }
    }
}

impl OperatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: OperatorConfig = toml::from_str(content)?;
        // Surface bad durations and unknown features at load time.
        config.timeouts()?;
        config.feature_set()?;
        parse_duration(&config.operator.reconcile_interval).ok_or_else(|| {
            anyhow::anyhow!(
                "invalid reconcile_interval: {}",
                config.operator.reconcile_interval
            )
        })?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the `[timeouts]` section into a deadline policy.
    pub fn timeouts(&self) -> anyhow::Result<Timeouts> {
        let parse = |field: &str, value: &str| {
            parse_duration(value)
                .ok_or_else(|| anyhow::anyhow!("invalid {field} timeout: {value}"))
        };
        Ok(Timeouts::new(
            parse("kubernetes", &self.timeouts.kubernetes)?,
            parse("database", &self.timeouts.database)?,
            parse("reconciliation", &self.timeouts.reconciliation)?,
        ))
    }

    /// Resolve the `[features]` overrides against the static feature table.
    pub fn feature_set(&self) -> anyhow::Result<FeatureSet> {
        Ok(FeatureSet::from_overrides(&self.features)?)
    }

    pub fn reconcile_interval(&self) -> Duration {
        parse_duration(&self.operator.reconcile_interval).unwrap_or(Duration::from_secs(60))
    }

    pub fn discovery_interval(&self) -> Duration {
        parse_duration(&self.operator.discovery_interval).unwrap_or(Duration::from_secs(10))
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;

    #[test]
    fn empty_config_uses_defaults() {
        let config = OperatorConfig::parse("").unwrap();
        assert!(config.scaling.enabled);
        assert_eq!(config.operator.api_listen, "0.0.0.0:8528");

        let timeouts = config.timeouts().unwrap();
        assert_eq!(timeouts.kubernetes().duration(), Duration::from_secs(2));
        assert_eq!(timeouts.database().duration(), Duration::from_secs(10));
        assert_eq!(timeouts.reconciliation().duration(), Duration::from_secs(60));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(60));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[operator]
namespace = "databases"
reconcile_interval = "30s"
cluster_domain = "cluster.local"

[timeouts]
kubernetes = "5s"
database = "500ms"

[scaling]
enabled = false

[features]
graceful-shutdown = false
short-pod-names = true
"#;
        let config = OperatorConfig::parse(toml_str).unwrap();
        assert_eq!(config.operator.namespace.as_deref(), Some("databases"));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(30));
        assert!(!config.scaling.enabled);

        let timeouts = config.timeouts().unwrap();
        assert_eq!(timeouts.database().duration(), Duration::from_millis(500));

        let features = config.feature_set().unwrap();
        assert!(!features.enabled(Feature::GracefulShutdown));
        assert!(features.enabled(Feature::ShortPodNames));
    }

    #[test]
    fn unknown_feature_is_rejected() {
        let err = OperatorConfig::parse("[features]\nturbo-mode = true\n").unwrap_err();
        assert!(err.to_string().contains("turbo-mode"));
    }

    #[test]
    fn bad_duration_is_rejected() {
        assert!(OperatorConfig::parse("[timeouts]\nkubernetes = \"soon\"\n").is_err());
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");
        let config = OperatorConfig::default();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = OperatorConfig::from_file(&path).unwrap();
        assert_eq!(loaded.operator.reconcile_interval, "60s");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("later"), None);
    }
}
