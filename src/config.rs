use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::nacha::MergeConditions;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub odfi: Option<OdfiConfig>,
    pub shards: Vec<ShardConfig>,
    pub upload_agents: Vec<UploadAgentConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
}

/// Local filesystem layout for pending sets, cutoff batches, and
/// per-poll download scratch directories.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for pending files, cutoff batches, and scratch trees
    pub directory: String,
    /// Delete the per-poll scratch tree after downstream handoff
    pub cleanup_local_directory: bool,
    /// Keep files on the ODFI's server after a successful download
    pub keep_remote_files: bool,
    /// Skip zero-byte remote files during download
    pub remove_zero_byte_files: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: "storage".to_string(),
            cleanup_local_directory: false,
            keep_remote_files: false,
            remove_zero_byte_files: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Seconds between cutoff attempts for every shard
    pub cutoff_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cutoff_interval_secs: 300,
        }
    }
}

impl PipelineConfig {
    pub fn cutoff_interval(&self) -> Duration {
        Duration::from_secs(self.cutoff_interval_secs)
    }
}

/// Inbound polling of return, reconciliation, and inbound files from
/// the ODFI's server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OdfiConfig {
    pub interval_secs: u64,
    pub shard_names: Vec<String>,
}

impl OdfiConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("Invalid odfi.interval_secs: must be > 0");
        }
        if self.shard_names.is_empty() {
            anyhow::bail!("Invalid odfi.shard_names: must not be empty");
        }
        Ok(())
    }
}

/// A logical routing partition with its own pending set, upload agent,
/// and merge policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShardConfig {
    pub name: String,
    /// References an entry in `upload_agents` by id
    pub upload_agent: String,
    #[serde(default)]
    pub mergable: MergableConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MergableConfig {
    /// Per-file caps applied while merging; merge with defaults when unset
    pub conditions: Option<MergeConditions>,
    /// Flatten batches after merging
    #[serde(default)]
    pub flatten_batches: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadAgentConfig {
    pub id: String,
    #[serde(default)]
    pub paths: AgentPathsConfig,
    /// Local directory tree transport
    pub filesystem: Option<FilesystemAgentConfig>,
    /// In-memory transport for tests and dry runs
    #[serde(default)]
    pub mock: bool,
}

/// Remote directory names, stable for the life of the agent.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentPathsConfig {
    pub inbound: String,
    pub outbound: String,
    pub reconciliation: String,
    #[serde(rename = "return")]
    pub return_: String,
}

impl Default for AgentPathsConfig {
    fn default() -> Self {
        Self {
            inbound: "inbound".to_string(),
            outbound: "outbound".to_string(),
            reconciliation: "reconciliation".to_string(),
            return_: "return".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilesystemAgentConfig {
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NotificationsConfig {
    pub slack: Option<SlackConfig>,
    pub pagerduty: Option<PagerDutyConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SlackConfig {
    pub webhook_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PagerDutyConfig {
    pub routing_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LeaseConfig {
    pub ttl_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    /// Load config from YAML file based on environment
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over YAML config.
    ///
    /// Supported overrides:
    /// - ACHGW_LOG_LEVEL: Log level (trace/debug/info/warn/error)
    /// - ACHGW_STORAGE_DIRECTORY: Root directory for local storage
    /// - ACHGW_SLACK_WEBHOOK_URL: Slack incoming webhook URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("ACHGW_LOG_LEVEL") {
            tracing::info!(
                "Config override: log_level = {} (from ACHGW_LOG_LEVEL)",
                level
            );
            self.log_level = level;
        }
        if let Ok(dir) = std::env::var("ACHGW_STORAGE_DIRECTORY") {
            tracing::info!(
                "Config override: storage.directory = {} (from ACHGW_STORAGE_DIRECTORY)",
                dir
            );
            self.storage.directory = dir;
        }
        if let Ok(url) = std::env::var("ACHGW_SLACK_WEBHOOK_URL") {
            tracing::info!(
                "Config override: notifications.slack.webhook_url = [REDACTED] (from ACHGW_SLACK_WEBHOOK_URL)"
            );
            self.notifications.slack = Some(SlackConfig { webhook_url: url });
        }
    }

    /// Validate configuration at startup
    ///
    /// Returns an error if any critical configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        if self.pipeline.cutoff_interval_secs == 0 {
            anyhow::bail!("Invalid pipeline.cutoff_interval_secs: must be > 0");
        }

        if self.shards.is_empty() {
            anyhow::bail!("No shards configured");
        }

        for shard in &self.shards {
            if self.upload_agent(&shard.upload_agent).is_none() {
                anyhow::bail!(
                    "Shard {} references unknown upload_agent '{}'",
                    shard.name,
                    shard.upload_agent
                );
            }
        }

        if let Some(odfi) = &self.odfi {
            odfi.validate()?;
            for name in &odfi.shard_names {
                if self.shard(name).is_none() {
                    anyhow::bail!("odfi.shard_names references unknown shard '{}'", name);
                }
            }
        }

        for agent in &self.upload_agents {
            if agent.filesystem.is_none() && !agent.mock {
                anyhow::bail!("Upload agent '{}' has no transport configured", agent.id);
            }
        }

        Ok(())
    }

    pub fn shard(&self, name: &str) -> Option<&ShardConfig> {
        self.shards.iter().find(|s| s.name == name)
    }

    pub fn upload_agent(&self, id: &str) -> Option<&UploadAgentConfig> {
        self.upload_agents.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "ach-gateway.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: false,
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
            odfi: Some(OdfiConfig {
                interval_secs: 60,
                shard_names: vec!["sbx".to_string()],
            }),
            shards: vec![ShardConfig {
                name: "sbx".to_string(),
                upload_agent: "local".to_string(),
                mergable: MergableConfig::default(),
            }],
            upload_agents: vec![UploadAgentConfig {
                id: "local".to_string(),
                paths: AgentPathsConfig::default(),
                filesystem: None,
                mock: true,
            }],
            notifications: NotificationsConfig::default(),
            lease: LeaseConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = base_config();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_odfi_interval() {
        let mut config = base_config();
        config.odfi = Some(OdfiConfig {
            interval_secs: 0,
            shard_names: vec!["sbx".to_string()],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_odfi_shards() {
        let mut config = base_config();
        config.odfi = Some(OdfiConfig {
            interval_secs: 60,
            shard_names: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_upload_agent() {
        let mut config = base_config();
        config.shards[0].upload_agent = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_agent_without_transport() {
        let mut config = base_config();
        config.upload_agents[0].mock = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_storage_directory() {
        assert_eq!(StorageConfig::default().directory, "storage");
    }
}
