//! Configuration file handling
//!
//! The config is a TOML file with a `[proxmox]` table for the virtualization
//! manager and one table per storage pool id holding the credentials of the
//! ONTAP cluster backing that pool:
//!
//! ```toml
//! [proxmox]
//! host = "pve1.example.com:8006"
//! user = "root@pam"
//! password = "secret"
//! verify = false
//!
//! [nfs-data]
//! host = "cluster1.example.com"
//! user = "admin"
//! password = "secret"
//! ```
//!
//! It is loaded once in `main` and handed to the client constructors.

use crate::domain::naming;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Name of the table holding Proxmox VE credentials
pub const PROXMOX_SECTION: &str = "proxmox";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub proxmox: ProxmoxAccess,
    /// Controller access keyed by storage pool id
    #[serde(flatten)]
    pub pools: BTreeMap<String, ControllerAccess>,
}

/// Proxmox VE API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxAccess {
    #[serde(alias = "proxmox_host")]
    pub host: String,
    #[serde(alias = "proxmox_user")]
    pub user: String,
    #[serde(alias = "proxmox_pass")]
    pub password: String,
    #[serde(alias = "proxmox_verify", default = "default_verify")]
    pub verify: bool,
    /// Upper bound for waiting on a VM task (suspend, shutdown, start)
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Upper bound for retrying read-only calls on transport errors
    #[serde(default = "default_retry")]
    pub retry_secs: u64,
}

/// ONTAP cluster access for one storage pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerAccess {
    pub host: String,
    pub user: String,
    #[serde(alias = "pass")]
    pub password: String,
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Upper bound for waiting on an asynchronous ONTAP job
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_retry")]
    pub retry_secs: u64,
}

fn default_verify() -> bool {
    true
}

fn default_task_timeout() -> u64 {
    600
}

fn default_job_timeout() -> u64 {
    300
}

fn default_retry() -> u64 {
    30
}

impl ProxmoxAccess {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl ControllerAccess {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl Config {
    /// Load and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Parse config file content
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Controller access for a pool; clone pools use their source pool's section
    pub fn controller_access(&self, pool_id: &str) -> Result<&ControllerAccess> {
        let section = naming::config_section(pool_id);
        if section == PROXMOX_SECTION {
            return Err(Error::Configuration(format!(
                "Storage pool id {} collides with the [{}] section",
                pool_id, PROXMOX_SECTION
            )));
        }
        self.pools.get(section).ok_or_else(|| {
            Error::Configuration(format!(
                "No controller section [{}] for storage pool {}",
                section, pool_id
            ))
        })
    }
}

/// Normalize a host setting into a base URL.
///
/// Bare hosts get `https://` and, when `default_port` is set and no port was
/// given, that port. Explicit `http://` or `https://` URLs are kept as they are.
pub fn base_url(host: &str, default_port: Option<u16>) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        return host.to_string();
    }
    match default_port {
        Some(port) if !host.contains(':') => format!("https://{}:{}", host, port),
        _ => format!("https://{}", host),
    }
}
