//! Probe implementations.

use crate::types::{ProbeOutcome, ProbeTarget};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Probe executor trait
#[async_trait]
pub trait Prober: Send + Sync {
    /// Run one probe against `target`, giving up after `timeout_duration`
    async fn probe(&self, target: &ProbeTarget, timeout_duration: Duration) -> ProbeOutcome;

    /// Get the name of this prober
    fn name(&self) -> &str;
}

/// TCP connect prober
#[derive(Debug, Default, Clone)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: &ProbeTarget, timeout_duration: Duration) -> ProbeOutcome {
        let ProbeTarget::Tcp { address, port } = target else {
            return ProbeOutcome::failure(Duration::ZERO, format!("tcp prober cannot run {}", target));
        };

        let start = Instant::now();
        match timeout(timeout_duration, TcpStream::connect((address.as_str(), *port))).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(%address, port, duration_ms = duration.as_millis(), "TCP probe successful");
                ProbeOutcome::success(duration)
            }
            Ok(Err(e)) => {
                warn!(%address, port, error = %e, "TCP probe failed");
                ProbeOutcome::failure(start.elapsed(), format!("dial tcp {}:{}: {}", address, port, e))
            }
            Err(_) => {
                warn!(%address, port, "TCP probe timed out");
                ProbeOutcome::failure(start.elapsed(), format!("dial tcp {}:{}: i/o timeout", address, port))
            }
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// HTTP GET prober
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a new HTTP prober
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &ProbeTarget, timeout_duration: Duration) -> ProbeOutcome {
        let ProbeTarget::Http { url, expect } = target else {
            return ProbeOutcome::failure(Duration::ZERO, format!("http prober cannot run {}", target));
        };

        let start = Instant::now();
        let request = self.client.get(url).timeout(timeout_duration);

        match timeout(timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();
                debug!(%url, status = status_code, expect, duration_ms = duration.as_millis(), "HTTP probe answered");
                ProbeOutcome::http(status_code, *expect, duration)
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "HTTP probe failed");
                ProbeOutcome::failure(start.elapsed(), format!("GET {}: {}", url, e))
            }
            Err(_) => {
                warn!(%url, "HTTP probe timed out");
                ProbeOutcome::failure(start.elapsed(), format!("GET {}: timeout", url))
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// ICMP echo prober backed by the system `ping` binary, so no raw-socket
/// privileges are needed.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl Default for PingProber {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

impl PingProber {
    /// Use a specific ping executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, address: &str, timeout_duration: Duration) -> Command {
        let secs = timeout_duration.as_secs().max(1).to_string();
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c").arg("1");
        if cfg!(target_os = "macos") {
            cmd.arg("-t").arg(&secs);
        } else {
            cmd.arg("-W").arg(&secs);
        }
        cmd.arg(address).kill_on_drop(true);
        cmd
    }
}

/// Extract the round-trip time from a `time=12.3 ms` fragment.
fn parse_rtt(stdout: &str) -> Option<Duration> {
    let rest = &stdout[stdout.find("time=")? + "time=".len()..];
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let millis: f64 = number.parse().ok()?;
    Some(Duration::from_secs_f64(millis / 1000.0))
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, target: &ProbeTarget, timeout_duration: Duration) -> ProbeOutcome {
        let ProbeTarget::Ping { address } = target else {
            return ProbeOutcome::failure(Duration::ZERO, format!("ping prober cannot run {}", target));
        };

        let start = Instant::now();
        // One second of slack so the child can report its own timeout first.
        let deadline = timeout_duration + Duration::from_secs(1);

        match timeout(deadline, self.command(address, timeout_duration).output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let rtt = parse_rtt(&stdout).unwrap_or_else(|| start.elapsed());
                debug!(%address, rtt_ms = rtt.as_millis(), "Ping probe successful");
                ProbeOutcome::success(rtt)
            }
            Ok(Ok(_)) => {
                debug!(%address, "Ping probe got no reply");
                ProbeOutcome::silent_failure(start.elapsed())
            }
            Ok(Err(e)) => {
                warn!(%address, program = %self.program, error = %e, "Ping probe could not run");
                ProbeOutcome::failure(start.elapsed(), format!("ping {}: {}", address, e))
            }
            Err(_) => {
                warn!(%address, "Ping probe timed out");
                ProbeOutcome::silent_failure(start.elapsed())
            }
        }
    }

    fn name(&self) -> &str {
        "ping"
    }
}

/// Routes each target to the prober for its kind.
pub struct SystemProber {
    ping: PingProber,
    http: HttpProber,
    tcp: TcpProber,
}

impl SystemProber {
    /// Create the default set of probers
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            ping: PingProber::default(),
            http: HttpProber::new()?,
            tcp: TcpProber,
        })
    }
}

#[async_trait]
impl Prober for SystemProber {
    async fn probe(&self, target: &ProbeTarget, timeout_duration: Duration) -> ProbeOutcome {
        match target {
            ProbeTarget::Ping { .. } => self.ping.probe(target, timeout_duration).await,
            ProbeTarget::Http { .. } => self.http.probe(target, timeout_duration).await,
            ProbeTarget::Tcp { .. } => self.tcp.probe(target, timeout_duration).await,
        }
    }

    fn name(&self) -> &str {
        "system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_prober_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let target = ProbeTarget::Tcp {
            address: "127.0.0.1".to_string(),
            port,
        };
        let outcome = TcpProber.probe(&target, Duration::from_secs(1)).await;
        assert!(outcome.ok);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_tcp_prober_closed_port() {
        // Bind then drop to find a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let target = ProbeTarget::Tcp {
            address: "127.0.0.1".to_string(),
            port,
        };
        let outcome = TcpProber.probe(&target, Duration::from_millis(200)).await;
        assert!(!outcome.ok);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_http_prober_connection_error() {
        let prober = HttpProber::new().unwrap();
        let target = ProbeTarget::Http {
            url: "http://127.0.0.1:1/health".to_string(),
            expect: 200,
        };

        let outcome = prober.probe(&target, Duration::from_millis(200)).await;
        assert!(!outcome.ok);
        assert!(outcome.status_code.is_none());
        assert!(outcome.latency <= Duration::from_millis(500));
    }

    #[test]
    fn test_prober_rejects_mismatched_target() {
        let target = ProbeTarget::Ping {
            address: "127.0.0.1".to_string(),
        };
        let outcome = tokio_test::block_on(TcpProber.probe(&target, Duration::from_millis(100)));
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("tcp prober cannot run"));
    }

    #[tokio::test]
    async fn test_ping_prober_missing_binary() {
        let prober = PingProber::with_program("/nonexistent/ping");
        let target = ProbeTarget::Ping {
            address: "127.0.0.1".to_string(),
        };
        let outcome = prober.probe(&target, Duration::from_secs(1)).await;
        assert!(!outcome.ok);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_parse_rtt() {
        let stdout = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=13.4 ms\n";
        assert_eq!(parse_rtt(stdout), Some(Duration::from_secs_f64(0.0134)));
        assert_eq!(parse_rtt("no reply"), None);
    }
}
