//! Hostwatch monitoring engine.
//!
//! Tracks the health of a fleet of hosts through ping, HTTP and TCP checks.
//! Checks may depend on a parent check by ID; a failure while a parent is
//! down is reported as BLOCKED and never alerts.
//!
//! - [`StatusStore`]: lock-protected hosts and checks, admin operations
//! - [`Evaluator`]: one probing pass over every enabled check
//! - [`Scheduler`]: runs passes on a fixed interval until cancelled
//! - [`EventLog`]: bounded history of `down` / `recovered` events
//! - [`Dispatcher`]: bounded, fire-and-forget notification queue
//!
//! # Example
//!
//! ```no_run
//! use hostwatch::{EventLog, Evaluator, Scheduler, StatusStore};
//! use probe::SystemProber;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(StatusStore::from_file("monitor.yaml")?);
//! let events = Arc::new(EventLog::new());
//! let evaluator = Evaluator::new(store.clone(), Arc::new(SystemProber::new()?), events.clone());
//!
//! let cancel = CancellationToken::new();
//! let handle = Scheduler::new(Arc::new(evaluator), Duration::from_secs(10)).spawn(cancel.clone());
//!
//! // ... later
//! cancel.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod config;
pub mod evaluator;
pub mod events;
pub mod metrics;
pub mod notify;
pub mod persist;
pub mod resolver;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod transition;

pub use analytics::{AggregateStats, CheckAnalytics, HostAnalytics, LatencyStats};
pub use config::{
    CheckConfig, CheckOptions, CheckType, Config, ConfigFormat, HostConfig, MqttSettings,
    NotifyFlags, PushoverSettings, Settings, TelegramSettings,
};
pub use evaluator::{Evaluator, PassSummary};
pub use events::EventLog;
pub use metrics::MetricsRegistry;
pub use notify::{Alert, AlertSink, AlertStatus, Channel, Dispatcher, HealthPinger, NotifyError};
pub use persist::ConfigPersister;
pub use resolver::DependencyResolver;
pub use scheduler::Scheduler;
pub use status::{CheckKey, CheckState, CheckStatus, DataPoint, HostStatus};
pub use store::StatusStore;
pub use transition::{Event, Transition, TransitionKind};
