//! Probe executors for hostwatch checks.
//!
//! Every check type has one probe:
//! - ping: ICMP echo via the system `ping` binary
//! - http: GET with an expected status code
//! - tcp: plain connect
//!
//! A probe never returns an error. Failures are reported as an unsuccessful
//! [`ProbeOutcome`] so the engine can classify them as DOWN or BLOCKED.
//!
//! # Example
//!
//! ```no_run
//! use probe::{Prober, ProbeTarget, SystemProber};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = SystemProber::new()?;
//! let target = ProbeTarget::Tcp { address: "192.168.1.10".to_string(), port: 22 };
//! let outcome = prober.probe(&target, target.kind().timeout()).await;
//! println!("ok={} latency={}ms", outcome.ok, outcome.latency_ms());
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod types;

pub use checkers::{HttpProber, PingProber, Prober, SystemProber, TcpProber};
pub use types::{ProbeKind, ProbeOutcome, ProbeTarget};
