//! Runtime status of hosts and checks.

use crate::config::{CheckConfig, HostConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Position of a check inside the store: host index, then check index.
///
/// Keys are only stable until the next structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckKey {
    pub host: usize,
    pub check: usize,
}

impl CheckKey {
    pub fn new(host: usize, check: usize) -> Self {
        Self { host, check }
    }
}

/// Observed state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    /// Never evaluated
    Unknown,
    /// Last probe met its expectation
    Up,
    /// Last probe failed while the parent chain was healthy
    Down,
    /// Last probe failed while a parent was unhealthy
    Blocked,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Unknown => write!(f, "UNKNOWN"),
            CheckState::Up => write!(f, "UP"),
            CheckState::Down => write!(f, "DOWN"),
            CheckState::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// One entry of the rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub ok: bool,
    pub latency_ms: i64,
}

/// Runtime status of one check, owning its declarative config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckStatus {
    pub config: CheckConfig,
    pub ok: bool,
    pub parent_failed: bool,
    pub message: String,
    pub latency_ms: i64,
    pub checked_at: Option<DateTime<Utc>>,
    /// Sparkline data, newest last
    pub latency_history: VecDeque<i64>,
    /// Analytics data, newest last
    pub full_history: VecDeque<DataPoint>,
    pub total_checks: u64,
    pub success_checks: u64,
    pub last_down_at: Option<DateTime<Utc>>,
    pub last_up_at: Option<DateTime<Utc>>,
}

impl CheckStatus {
    pub fn new(config: CheckConfig) -> Self {
        Self {
            config,
            ok: false,
            parent_failed: false,
            message: String::new(),
            latency_ms: 0,
            checked_at: None,
            latency_history: VecDeque::new(),
            full_history: VecDeque::new(),
            total_checks: 0,
            success_checks: 0,
            last_down_at: None,
            last_up_at: None,
        }
    }

    pub fn state(&self) -> CheckState {
        if self.checked_at.is_none() {
            CheckState::Unknown
        } else if self.ok {
            CheckState::Up
        } else if self.parent_failed {
            CheckState::Blocked
        } else {
            CheckState::Down
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Runtime status of one host and its checks, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    pub name: String,
    pub address: String,
    pub health_ping_url: Option<String>,
    pub checks: Vec<CheckStatus>,
}

impl HostStatus {
    pub fn from_config(host: HostConfig) -> Self {
        Self {
            name: host.name,
            address: host.address,
            health_ping_url: host.healthchecks_ping_url,
            checks: host.checks.into_iter().map(CheckStatus::new).collect(),
        }
    }

    /// Declarative view of this host.
    pub fn to_config(&self) -> HostConfig {
        HostConfig {
            name: self.name.clone(),
            address: self.address.clone(),
            healthchecks_ping_url: self.health_ping_url.clone(),
            checks: self.checks.iter().map(|c| c.config.clone()).collect(),
        }
    }
}
