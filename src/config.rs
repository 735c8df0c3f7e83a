use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// What to answer for a directory request that has no index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryPolicy {
    Listing,
    Forbidden,
    NotFound,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub root_dir: PathBuf,
    pub max_connections: usize,
    pub max_header_bytes: usize,
    pub max_header_count: usize,
    pub read_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub directory_policy: DirectoryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            root_dir: PathBuf::from("."),
            max_connections: 1024,
            max_header_bytes: 16 * 1024,
            max_header_count: 100,
            read_timeout_secs: 30,
            response_timeout_secs: 60,
            shutdown_grace_secs: 5,
            directory_policy: DirectoryPolicy::Listing,
        }
    }
}

impl Config {
    /// Loads configuration from the file named by `ATRIUM_CONFIG` (if set),
    /// then applies the `LISTEN` and `ROOT` environment overrides.
    pub fn load() -> Self {
        let mut cfg = match std::env::var("ATRIUM_CONFIG") {
            Ok(path) => match Self::from_file(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to load config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("ROOT") {
            cfg.root_dir = PathBuf::from(root);
        }

        cfg
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
