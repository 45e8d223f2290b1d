//! Probe targets and outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Timeout applied to ping probes.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout applied to HTTP probes.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout applied to TCP probes.
pub const TCP_TIMEOUT: Duration = Duration::from_secs(5);

/// Kind of probe, one per check type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Ping,
    Http,
    Tcp,
}

impl ProbeKind {
    /// Fixed per-kind timeout.
    pub fn timeout(self) -> Duration {
        match self {
            ProbeKind::Ping => PING_TIMEOUT,
            ProbeKind::Http => HTTP_TIMEOUT,
            ProbeKind::Tcp => TCP_TIMEOUT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to probe, with the type-specific parameters already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// ICMP echo against a host address
    Ping { address: String },

    /// HTTP GET; healthy only when the response code equals `expect`
    Http { url: String, expect: u16 },

    /// TCP connect to `address:port`
    Tcp { address: String, port: u16 },
}

impl ProbeTarget {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeTarget::Ping { .. } => ProbeKind::Ping,
            ProbeTarget::Http { .. } => ProbeKind::Http,
            ProbeTarget::Tcp { .. } => ProbeKind::Tcp,
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Ping { address } => write!(f, "ping {}", address),
            ProbeTarget::Http { url, expect } => write!(f, "GET {} (expect {})", url, expect),
            ProbeTarget::Tcp { address, port } => write!(f, "tcp {}:{}", address, port),
        }
    }
}

/// Raw result of a single probe.
///
/// A failed probe is a normal outcome, not an error: the caller decides
/// whether it means DOWN or BLOCKED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Probe met its expectation
    pub ok: bool,

    /// Time spent on the probe
    pub latency: Duration,

    /// Response code (HTTP probes only)
    pub status_code: Option<u16>,

    /// Transport-level error, if the probe never got an answer
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Create a successful outcome
    pub fn success(latency: Duration) -> Self {
        Self {
            ok: true,
            latency,
            status_code: None,
            error: None,
        }
    }

    /// Create a failed outcome carrying a transport error
    pub fn failure(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            latency,
            status_code: None,
            error: Some(error.into()),
        }
    }

    /// Create a failed outcome with no error detail (no reply, port closed)
    pub fn silent_failure(latency: Duration) -> Self {
        Self {
            ok: false,
            latency,
            status_code: None,
            error: None,
        }
    }

    /// Create an HTTP outcome from a received response code
    pub fn http(status_code: u16, expect: u16, latency: Duration) -> Self {
        Self {
            ok: status_code == expect,
            latency,
            status_code: Some(status_code),
            error: None,
        }
    }

    /// Latency in whole milliseconds
    pub fn latency_ms(&self) -> i64 {
        i64::try_from(self.latency.as_millis()).unwrap_or(i64::MAX)
    }
}
