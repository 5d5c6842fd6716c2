//! Configuration file loading
//!
//! The file is the core [`Config`] plus an optional `[[clusters]]` list
//! describing the backend topology for offline commands.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use strata_common::Config;
use strata_placement::ClusterDescriptor;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub core: Config,
    #[serde(default)]
    pub clusters: Vec<ClusterDescriptor>,
}

impl CliConfig {
    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.core.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strata_common::{ClusterStatus, PoolRegime, StorageClass};

    const SAMPLE: &str = r#"
[cache]
max_bytes = 1048576
max_entry_size = 65536

[recycle]
workers_per_cluster = 8

[logging]
format = "json"

[[clusters]]
id = "ceph-a"
weight = 3
storage_classes = ["STANDARD"]
pools = [
  { name = "rabbit", storage_class = "STANDARD", regime = "small" },
  { name = "tiger", storage_class = "STANDARD", regime = "large" },
]

[[clusters]]
id = "ceph-b"
weight = 1
status = "dead"
capacity_hint = 1000000
storage_classes = ["STANDARD", "GLACIER"]
pools = [{ name = "cold", storage_class = "GLACIER", regime = "large" }]
"#;

    #[test]
    fn test_parse_sample() {
        let config = CliConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.core.cache.max_bytes, 1_048_576);
        assert!(config.core.cache.enabled);
        assert_eq!(config.core.recycle.workers_per_cluster, 8);
        assert_eq!(config.core.recycle.max_retries, 4);
        assert_eq!(config.core.logging.format, "json");

        assert_eq!(config.clusters.len(), 2);
        let a = &config.clusters[0];
        assert_eq!(a.weight, 3);
        assert_eq!(a.pools[0].regime, PoolRegime::Small);
        let b = &config.clusters[1];
        assert_eq!(b.status, ClusterStatus::Dead);
        assert_eq!(b.capacity_hint, Some(1_000_000));
        assert!(b.storage_classes.contains(&StorageClass::Glacier));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CliConfig::load(file.path()).unwrap();
        assert_eq!(config.clusters.len(), 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.core, Config::default());
        assert!(config.clusters.is_empty());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[recycle]\nworkers_per_cluster = 0\n").unwrap();
        assert!(CliConfig::load(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[cache\n").unwrap();
        assert!(CliConfig::load(file.path()).is_err());
    }
}
