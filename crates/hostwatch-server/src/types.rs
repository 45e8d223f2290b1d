//! Resolved runtime settings for the hostwatch daemon.

use hostwatch::notify::{DEFAULT_QUEUE_SIZE, DEFAULT_SEND_TIMEOUT};
use hostwatch::scheduler::DEFAULT_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Monitor config file (hosts, checks, channel settings)
    pub config_path: PathBuf,

    /// Time between evaluation passes
    pub interval: Duration,

    /// Notification queue bound
    pub queue_size: usize,

    /// Per-delivery timeout for notifications and health pings
    pub send_timeout: Duration,

    /// Serve Prometheus metrics
    pub metrics_enabled: bool,

    /// Metrics listen address
    pub metrics_listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/hostwatch/monitor.yaml"),
            interval: DEFAULT_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            metrics_enabled: true,
            metrics_listen_addr: "127.0.0.1:9464".to_string(),
        }
    }
}
