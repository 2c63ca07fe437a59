use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest partition range a single assignment request may cover by default
pub const DEFAULT_MAX_PARTITIONS_PER_REQUEST: u32 = 100_000;

/// Which process a configuration is loaded for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Server,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub server: ShuffleServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    /// A server silent for longer than this is evicted
    pub heartbeat_timeout_ms: u64,
    /// An application idle for longer than this is forgotten
    pub app_expired_ms: u64,
    /// Upper bound on servers considered for one shuffle
    pub shuffle_nodes_max: usize,
    /// Upper bound on `partition_range_end - partition_range_start`
    pub max_partitions_per_request: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 19995,
            heartbeat_timeout_ms: 30_000,
            app_expired_ms: 60_000,
            shuffle_nodes_max: 9,
            max_partitions_per_request: DEFAULT_MAX_PARTITIONS_PER_REQUEST,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub const fn app_expired(&self) -> Duration {
        Duration::from_millis(self.app_expired_ms)
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where a shuffle server persists spilled data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    Memory,
    LocalFile,
    MemoryLocalFile,
    Hdfs,
    MemoryHdfs,
    LocalFileHdfs,
    MemoryLocalFileHdfs,
}

impl StorageType {
    /// Whether data lands on the local disks listed in `storage_base_path`
    #[must_use]
    pub const fn uses_local_disk(self) -> bool {
        matches!(
            self,
            Self::LocalFile
                | Self::MemoryLocalFile
                | Self::LocalFileHdfs
                | Self::MemoryLocalFileHdfs
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleServerConfig {
    /// Explicit identity; derived from `ip` and `port` when unset
    pub id: Option<String>,
    /// Advertised address; the hostname is used when unset
    pub ip: Option<String>,
    pub port: u16,
    pub coordinator_url: String,
    pub heartbeat_interval_ms: u64,
    /// Extra tags; the server version tag is always added
    pub tags: Vec<String>,
    pub storage_type: StorageType,
    pub storage_base_path: Vec<String>,
    pub health_check_enabled: bool,
    pub health_check_interval_ms: u64,
    pub health_storage_max_usage_percentage: f64,
    pub health_storage_recovery_usage_percentage: f64,
    /// Share of storage directories that must be healthy for the server to be
    pub health_min_storage_percentage: f64,
    /// Bytes of shuffle buffer reported as available memory
    pub buffer_capacity: i64,
}

impl Default for ShuffleServerConfig {
    fn default() -> Self {
        Self {
            id: None,
            ip: None,
            port: 19999,
            coordinator_url: "http://127.0.0.1:19995".to_string(),
            heartbeat_interval_ms: 10_000,
            tags: Vec::new(),
            storage_type: StorageType::LocalFile,
            storage_base_path: Vec::new(),
            health_check_enabled: false,
            health_check_interval_ms: 5_000,
            health_storage_max_usage_percentage: 90.0,
            health_storage_recovery_usage_percentage: 80.0,
            health_min_storage_percentage: 80.0,
            buffer_capacity: 1024 * 1024 * 1024,
        }
    }
}

impl ShuffleServerConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file, which must exist when given
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SHUFFLEHUB_COORDINATOR__HEARTBEAT_TIMEOUT_MS=3000, SHUFFLEHUB_SERVER__TAGS=a,b
        builder = builder.add_source(
            Environment::with_prefix("SHUFFLEHUB")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.tags")
                .with_list_parse_key("server.storage_base_path")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every section, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.coordinator_errors();
        errors.extend(self.server_errors());
        errors.extend(self.logging_errors());
        into_result(errors)
    }

    /// Check only the sections `role` reads
    pub fn validate_for(&self, role: Role) -> Result<(), Vec<String>> {
        let mut errors = match role {
            Role::Coordinator => self.coordinator_errors(),
            Role::Server => self.server_errors(),
        };
        errors.extend(self.logging_errors());
        into_result(errors)
    }

    fn coordinator_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let coordinator = &self.coordinator;
        if coordinator.heartbeat_timeout_ms == 0 {
            errors.push("coordinator.heartbeat_timeout_ms must be positive".to_string());
        }
        if coordinator.app_expired_ms == 0 {
            errors.push("coordinator.app_expired_ms must be positive".to_string());
        }
        if coordinator.shuffle_nodes_max == 0 {
            errors.push("coordinator.shuffle_nodes_max must be at least 1".to_string());
        }
        if coordinator.max_partitions_per_request == 0 {
            errors.push("coordinator.max_partitions_per_request must be at least 1".to_string());
        }
        errors
    }

    fn server_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let server = &self.server;
        if server.heartbeat_interval_ms == 0 {
            errors.push("server.heartbeat_interval_ms must be positive".to_string());
        }
        if server.health_check_enabled {
            if server.health_check_interval_ms == 0 {
                errors.push("server.health_check_interval_ms must be positive".to_string());
            }
            let max = server.health_storage_max_usage_percentage;
            let recovery = server.health_storage_recovery_usage_percentage;
            if !(0.0..=100.0).contains(&max) {
                errors.push(format!(
                    "server.health_storage_max_usage_percentage must be within 0..=100, got {max}"
                ));
            }
            if !(0.0..=100.0).contains(&recovery) {
                errors.push(format!(
                    "server.health_storage_recovery_usage_percentage must be within 0..=100, \
                     got {recovery}"
                ));
            }
            if recovery >= max {
                errors.push(format!(
                    "server.health_storage_recovery_usage_percentage ({recovery}) must be below \
                     server.health_storage_max_usage_percentage ({max})"
                ));
            }
            if !(0.0..=100.0).contains(&server.health_min_storage_percentage) {
                errors.push(format!(
                    "server.health_min_storage_percentage must be within 0..=100, got {}",
                    server.health_min_storage_percentage
                ));
            }
            if !server.storage_type.uses_local_disk() {
                errors.push(format!(
                    "server.health_check_enabled requires a local-disk storage type, got {:?}",
                    server.storage_type
                ));
            }
        }
        if server.storage_type.uses_local_disk() && server.storage_base_path.is_empty() {
            errors.push("server.storage_base_path must list at least one directory".to_string());
        }
        errors
    }

    fn logging_errors(&self) -> Vec<String> {
        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            return vec![format!("logging.level is not a valid level: {}", self.logging.level)];
        }
        Vec::new()
    }
}

fn into_result(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.server.storage_base_path = vec!["/tmp/shufflehub".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.coordinator.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.coordinator.app_expired(), Duration::from_secs(60));
        assert_eq!(config.server.heartbeat_interval(), Duration::from_secs(10));
        assert!(!config.server.health_check_enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bind_address() {
        let config = Config::default();
        assert_eq!(config.coordinator.bind_address(), "0.0.0.0:19995");
    }

    #[test]
    fn test_validate_accepts_defaults_with_storage_path() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = valid_config();
        config.server.health_check_enabled = true;
        config.server.health_storage_max_usage_percentage = 70.0;
        config.server.health_storage_recovery_usage_percentage = 75.0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be below"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.coordinator.heartbeat_timeout_ms = 0;
        config.coordinator.shuffle_nodes_max = 0;
        config.logging.level = "loud".to_string();

        let errors = config.validate().unwrap_err();
        // Missing storage path is reported too
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_validate_for_role_skips_other_section() {
        let config = Config::default();
        assert!(config.validate_for(Role::Coordinator).is_ok());

        let errors = config.validate_for(Role::Server).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("storage_base_path"));

        let mut config = valid_config();
        config.coordinator.max_partitions_per_request = 0;
        assert!(config.validate_for(Role::Server).is_ok());
        assert!(config.validate_for(Role::Coordinator).is_err());
    }

    #[test]
    fn test_coordinator_only_yaml_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.yaml");
        std::fs::write(&path, "coordinator:\n  port: 19995\n  heartbeat_timeout_ms: 3000\n")
            .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.coordinator.heartbeat_timeout_ms, 3000);
        assert_eq!(
            config.coordinator.max_partitions_per_request,
            DEFAULT_MAX_PARTITIONS_PER_REQUEST
        );
        assert!(config.validate_for(Role::Coordinator).is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(Config::from_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_validate_health_check_needs_local_disk() {
        let mut config = valid_config();
        config.server.health_check_enabled = true;
        config.server.storage_type = StorageType::Hdfs;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("local-disk")));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shufflehub.yaml");
        let yaml = "\
coordinator:
  heartbeat_timeout_ms: 3000
server:
  health_check_enabled: true
  storage_type: LOCAL_FILE
  storage_base_path:
    - /data1
    - /data2
";
        std::fs::write(&path, yaml).unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.coordinator.heartbeat_timeout_ms, 3000);
        assert_eq!(config.coordinator.app_expired_ms, 60_000);
        assert!(config.server.health_check_enabled);
        assert_eq!(config.server.storage_base_path, vec!["/data1", "/data2"]);
    }
}
