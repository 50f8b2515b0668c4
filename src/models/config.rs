use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sliding per-job time-to-live, reset on every write.
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,
    /// How often the background sweep reclaims expired jobs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// When set, step records persist to one JSON file per job under this
    /// directory; otherwise the cache is memory only.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8411
}

fn default_job_ttl_secs() -> u64 {
    86_400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_broadcast_capacity() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            job_ttl_secs: default_job_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            data_dir: None,
        }
    }
}
