//! Launcher configuration
//!
//! `LauncherConfig` is read from an optional JSON file; every absent field
//! keeps its default and the provider's command-line flags override the rest.
//! Durations are written as whole seconds.

use crate::error::LaunchError;
use crate::profile::default_shm_sizes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Applications shipped as `<image_prefix>-<key>:latest` images
pub const DEFAULT_APPLICATIONS: &[&str] = &[
    "gimp",
    "firefox",
    "chrome",
    "libreoffice",
    "evolution",
    "geary",
    "thunderbird",
    "nautilus",
];

/// Launcher configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Host directory holding one home directory per user plus `Public`
    pub base_dir: String,
    /// Docker network every application container is attached to
    pub network_name: String,
    /// Image repository prefix, e.g. `rayvtoll/vcd`
    pub image_prefix: String,
    /// Prefix for container names and hostnames
    pub name_prefix: String,
    /// Application keys that may be launched
    pub applications: Vec<String>,
    /// `/dev/shm` size in bytes per application key; unlisted keys get 64 MiB
    /// and keys outside `applications` are ignored
    pub shm_sizes: BTreeMap<String, i64>,
    /// Seccomp document applied to the chrome container
    pub seccomp_profile_path: PathBuf,
    /// Deadline for each runtime call (create, start)
    #[serde(with = "duration_secs")]
    pub runtime_timeout: Duration,
    /// Maximum number of launches in flight at once
    pub max_concurrent_launches: usize,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            base_dir: "/opt/vcde/".to_string(),
            network_name: "vcd_frontend".to_string(),
            image_prefix: "rayvtoll/vcd".to_string(),
            name_prefix: "vcd".to_string(),
            applications: DEFAULT_APPLICATIONS.iter().map(|a| a.to_string()).collect(),
            shm_sizes: default_shm_sizes(),
            seccomp_profile_path: PathBuf::from("/app/chrome.json"),
            runtime_timeout: Duration::from_secs(30),
            max_concurrent_launches: 16,
        }
    }
}

impl LauncherConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.base_dir.trim().is_empty() {
            return Err(LaunchError::Config("base_dir must not be empty".into()));
        }
        if self.network_name.trim().is_empty() {
            return Err(LaunchError::Config("network_name must not be empty".into()));
        }
        if self.image_prefix.trim().is_empty() {
            return Err(LaunchError::Config("image_prefix must not be empty".into()));
        }
        let prefix_ok = self
            .name_prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
            && self
                .name_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !prefix_ok {
            return Err(LaunchError::Config(format!(
                "name_prefix '{}' must start with a letter or digit and contain only [A-Za-z0-9_.-]",
                self.name_prefix
            )));
        }
        if self.applications.is_empty() {
            return Err(LaunchError::Config(
                "at least one application must be configured".into(),
            ));
        }
        if let Some(bad) = self
            .applications
            .iter()
            .find(|a| a.is_empty() || !a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        {
            return Err(LaunchError::Config(format!(
                "invalid application key '{}'",
                bad
            )));
        }
        for (app, size) in &self.shm_sizes {
            if *size <= 0 {
                return Err(LaunchError::Config(format!(
                    "shm size for '{}' must be positive",
                    app
                )));
            }
        }
        if self.runtime_timeout.is_zero() {
            return Err(LaunchError::Config("runtime_timeout must be positive".into()));
        }
        if self.max_concurrent_launches == 0 {
            return Err(LaunchError::Config(
                "max_concurrent_launches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `Duration` as a whole number of seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
