//! fwpool.toml configuration parser.
//!
//! The deployment configuration is supplied once and is read-only to the
//! handlers: construct it at startup, wrap it in an `Arc`, and pass it
//! explicitly into each handler invocation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One load balancer the appliances sit behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerBinding {
    /// Provider identifier of the load balancer.
    pub id: String,
    /// Backend set appliances register with.
    pub backend_set: String,
    /// Listener port backends are registered on.
    pub port: u16,
}

/// Deployment configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider identifier of the appliance pool.
    pub pool_id: String,
    /// Pool size bounds; scale decisions clamp to these.
    pub min_size: u32,
    pub max_size: u32,
    /// Instances added per scale-out event.
    #[serde(default = "default_scale_step")]
    pub scale_step: u32,

    /// Subnet and security-group references for the data interfaces.
    pub inside_subnet: String,
    pub inside_security_group: String,
    pub outside_subnet: String,
    pub outside_security_group: String,

    /// External (untrusted-side) and internal (trusted-side) load balancers.
    pub external_lb: LoadBalancerBinding,
    pub internal_lb: LoadBalancerBinding,

    /// Custom metric namespace and name for published utilization.
    pub metric_namespace: String,
    pub metric_name: String,

    /// Admin user for the appliance management interface.
    pub admin_user: String,
    /// Key reference used to decrypt the admin credential.
    pub credential_key_ref: String,
    /// Encrypted admin credential.
    pub credential_ciphertext: String,

    /// Object-storage URL of the day-0 configuration file.
    pub bootstrap_config_url: String,
    /// Appliance CLI command that reports load statistics.
    #[serde(default = "default_load_query")]
    pub load_query_command: String,

    /// Seconds to wait for a launched instance to reach Running.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Seconds between instance-state polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-attempt SSH connect timeout, seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Bounded SSH connect attempts before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Per-command execution timeout, seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Seconds to let in-flight connections drain before termination.
    #[serde(default = "default_drain_wait")]
    pub drain_wait_secs: u64,
}

fn default_scale_step() -> u32 {
    1
}

fn default_load_query() -> String {
    "show system performance".to_string()
}

fn default_ready_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_connect_attempts() -> u32 {
    6
}

fn default_command_timeout() -> u64 {
    30
}

fn default_drain_wait() -> u64 {
    30
}

impl OrchestratorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_id.is_empty() {
            return Err(ConfigError::Invalid("pool_id must not be empty".into()));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size {} exceeds max_size {}",
                self.min_size, self.max_size
            )));
        }
        if self.scale_step == 0 {
            return Err(ConfigError::Invalid("scale_step must be at least 1".into()));
        }
        if self.admin_user.is_empty() {
            return Err(ConfigError::Invalid("admin_user must not be empty".into()));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn drain_wait(&self) -> Duration {
        Duration::from_secs(self.drain_wait_secs)
    }
}

impl Default for OrchestratorConfig {
    /// Test-friendly defaults: tiny pool, zero waits.
    fn default() -> Self {
        Self {
            pool_id: "pool-1".to_string(),
            min_size: 1,
            max_size: 5,
            scale_step: 1,
            inside_subnet: "subnet-inside".to_string(),
            inside_security_group: "sg-inside".to_string(),
            outside_subnet: "subnet-outside".to_string(),
            outside_security_group: "sg-outside".to_string(),
            external_lb: LoadBalancerBinding {
                id: "lb-external".to_string(),
                backend_set: "fw-backends".to_string(),
                port: 443,
            },
            internal_lb: LoadBalancerBinding {
                id: "lb-internal".to_string(),
                backend_set: "fw-backends".to_string(),
                port: 443,
            },
            metric_namespace: "fwpool".to_string(),
            metric_name: "appliance_load".to_string(),
            admin_user: "admin".to_string(),
            credential_key_ref: "key-1".to_string(),
            credential_ciphertext: "ciphertext".to_string(),
            bootstrap_config_url: "https://objects.example/fw-bootstrap.conf".to_string(),
            load_query_command: default_load_query(),
            ready_timeout_secs: 0,
            poll_interval_secs: 0,
            connect_timeout_secs: 1,
            connect_attempts: 1,
            command_timeout_secs: 1,
            drain_wait_secs: 0,
        }
    }
}
