//! Hostwatch daemon.
//!
//! Loads the monitor config, probes every enabled check on a fixed interval
//! and delivers state-change alerts to the configured channels.
//!
//! # Components
//!
//! - **Config**: service settings (`hostwatch.yaml`) with validation
//! - **Channels**: Pushover and Telegram sinks, healthchecks.io style pinger
//! - **Mqtt**: state-change publisher
//! - **MetricsServer**: Prometheus `/metrics` endpoint
//! - **HostwatchServer**: wiring and graceful shutdown

pub mod channels;
pub mod config;
pub mod http_server;
pub mod mqtt;
pub mod server;
pub mod types;

pub use channels::{HttpHealthPinger, PushoverSink, TelegramSink};
pub use config::{Config, ConfigError};
pub use http_server::MetricsServer;
pub use mqtt::MqttSink;
pub use server::HostwatchServer;
pub use types::ServerConfig;
