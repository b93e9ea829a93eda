//! Operator feature table.
//!
//! The set of features is closed and known at compile time. A process
//! starts from each feature's default and applies overrides from config
//! once; the resulting [`FeatureSet`] is immutable afterwards.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

/// A named operator feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Members get a `graceful-shutdown` finalizer and are killed through
    /// the `KillMemberPod` action.
    GracefulShutdown,
    /// Pod names use `{deployment}-{role}-{id}` without the template suffix.
    ShortPodNames,
    /// Pod names get a random suffix instead of the template hash.
    RandomPodNames,
}

/// Static description of a feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInfo {
    pub feature: Feature,
    pub name: &'static str,
    pub description: &'static str,
    pub enabled_by_default: bool,
}

const TABLE: [FeatureInfo; 3] = [
    FeatureInfo {
        feature: Feature::GracefulShutdown,
        name: "graceful-shutdown",
        description: "Define graceful shutdown finalizers on member pods",
        enabled_by_default: true,
    },
    FeatureInfo {
        feature: Feature::ShortPodNames,
        name: "short-pod-names",
        description: "Use short pod names without the template suffix",
        enabled_by_default: false,
    },
    FeatureInfo {
        feature: Feature::RandomPodNames,
        name: "random-pod-names",
        description: "Use a random pod name suffix instead of the template hash",
        enabled_by_default: false,
    },
];

impl Feature {
    /// Every feature with its static description.
    pub fn table() -> &'static [FeatureInfo] {
        &TABLE
    }

    pub fn info(self) -> &'static FeatureInfo {
        // TABLE holds exactly one entry per variant, in declaration order.
        &TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TABLE.iter().find(|f| f.name == name).map(|f| f.feature)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("unknown feature: {0}")]
    Unknown(String),
}

/// Resolved on/off state of every feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: [bool; 3],
}

impl FeatureSet {
    /// Apply `name → enabled` overrides on top of the defaults.
    pub fn from_overrides(overrides: &HashMap<String, bool>) -> Result<Self, FeatureError> {
        let mut set = Self::default();
        for (name, &on) in overrides {
            let feature =
                Feature::from_name(name).ok_or_else(|| FeatureError::Unknown(name.clone()))?;
            debug!(feature = %feature, enabled = on, "feature override");
            set.enabled[feature as usize] = on;
        }
        Ok(set)
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.enabled[feature as usize]
    }

    /// Builder-style toggle, mostly for tests.
    pub fn with(mut self, feature: Feature, on: bool) -> Self {
        self.enabled[feature as usize] = on;
        self
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        let mut enabled = [false; 3];
        for info in &TABLE {
            enabled[info.feature as usize] = info.enabled_by_default;
        }
        Self { enabled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_variant_order() {
        for (i, info) in Feature::table().iter().enumerate() {
            assert_eq!(info.feature as usize, i);
        }
    }

    #[test]
    fn defaults() {
        let set = FeatureSet::default();
        assert!(set.enabled(Feature::GracefulShutdown));
        assert!(!set.enabled(Feature::ShortPodNames));
        assert!(!set.enabled(Feature::RandomPodNames));
    }

    #[test]
    fn overrides_by_name() {
        let overrides = HashMap::from([("random-pod-names".to_string(), true)]);
        let set = FeatureSet::from_overrides(&overrides).unwrap();
        assert!(set.enabled(Feature::RandomPodNames));
        assert!(set.enabled(Feature::GracefulShutdown));
    }

    #[test]
    fn name_lookup() {
        assert_eq!(Feature::from_name("graceful-shutdown"), Some(Feature::GracefulShutdown));
        assert_eq!(Feature::from_name("nope"), None);
        assert_eq!(Feature::ShortPodNames.to_string(), "short-pod-names");
    }
}
