use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tally_chain::{ChainConfig, PoolConfig, ProducerConfig};
use tally_monitor::MonitorConfig;

/// Node configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    #[serde(default = "default_prune_on_tick")]
    pub prune_on_tick: bool,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_block_interval_ms() -> u64 {
    tally_core::DEFAULT_BLOCK_TIME_MS
}

fn default_prune_on_tick() -> bool {
    true
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        toml::from_str(&content).context("unable to parse config")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self).context("unable to encode config")?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            block_interval: Duration::from_millis(self.block_interval_ms),
            prune_on_tick: self.prune_on_tick,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            block_interval_ms: default_block_interval_ms(),
            prune_on_tick: default_prune_on_tick(),
            chain: ChainConfig::default(),
            pool: PoolConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_chain::RotationPolicy;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/node.toml");

        let mut config = NodeConfig::default();
        config.chain.rotation_policy = RotationPolicy::FollowRoster;
        config.pool.batch_size = 25;
        config.save(&path).unwrap();

        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "data_dir = \"/var/lib/tally\"\n\n[pool]\nmax_size = 50\n").unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tally"));
        assert_eq!(config.pool.max_size, 50);
        assert_eq!(config.pool.batch_size, 10);
        assert_eq!(config.block_interval_ms, 3000);
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NodeConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
