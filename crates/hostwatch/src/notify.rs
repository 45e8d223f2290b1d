//! Asynchronous, best-effort notification dispatch.
//!
//! The evaluator never waits on a notification channel. Alerts and external
//! health pings are queued on a bounded channel and delivered by a single
//! worker task. When the queue is full the new job is dropped and counted.

use crate::config::{CheckType, NotifyFlags, Settings};
use crate::metrics::MetricsRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bound of the notification queue.
pub const DEFAULT_QUEUE_SIZE: usize = 256;
/// Default per-delivery timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification channel an alert can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Mqtt,
    Pushover,
    Telegram,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Mqtt => "mqtt",
            Channel::Pushover => "pushover",
            Channel::Telegram => "telegram",
        }
    }

    /// Whether a check with `flags` wants this channel.
    pub fn selected_by(self, flags: NotifyFlags) -> bool {
        match self {
            Channel::Mqtt => flags.mqtt,
            Channel::Pushover => flags.pushover,
            Channel::Telegram => flags.telegram,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Up,
    Down,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Up => "up",
            AlertStatus::Down => "down",
        }
    }
}

/// State-change notification payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub host: String,
    pub address: String,
    pub check_type: CheckType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
    /// HTTP checks only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,
    pub status: AlertStatus,
    pub message: String,
    pub latency_ms: i64,
    pub timestamp: DateTime<Utc>,
}

/// Notification delivery errors. Logged by the dispatcher, never retried.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One notification channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn channel(&self) -> Channel;

    /// Enabled and fully configured.
    async fn is_enabled(&self) -> bool;

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Pick up changed channel settings.
    async fn apply_settings(&self, _settings: &Settings) {}
}

/// Client for an external dead-man's-switch service.
#[async_trait]
pub trait HealthPinger: Send + Sync {
    async fn ping(&self, url: &str) -> Result<(), NotifyError>;
}

/// URL hit for a health ping: the base URL on success, `<base>/fail` on failure.
pub fn health_ping_url(base: &str, success: bool) -> String {
    if success {
        base.to_string()
    } else {
        format!("{}/fail", base.trim_end_matches('/'))
    }
}

#[derive(Debug)]
enum Job {
    Alert { alert: Alert, flags: NotifyFlags },
    HealthPing { url: String },
}

/// Cloneable handle to the notification worker.
///
/// The worker exits once every handle has been dropped and the queue has
/// drained.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Dispatcher {
    pub fn spawn(
        sinks: Vec<Arc<dyn AlertSink>>,
        pinger: Option<Arc<dyn HealthPinger>>,
        queue_size: usize,
        send_timeout: Duration,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let sinks = Arc::new(sinks);

        let worker = Worker {
            rx,
            sinks: sinks.clone(),
            pinger,
            send_timeout,
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(worker.run());

        (Self { tx, sinks, metrics }, handle)
    }

    /// Queue an alert for every channel selected by `flags`. Returns false
    /// when the job was dropped.
    pub fn alert(&self, alert: Alert, flags: NotifyFlags) -> bool {
        if !flags.any() {
            return true;
        }
        self.enqueue(Job::Alert { alert, flags })
    }

    /// Queue an external health ping against `base`.
    pub fn health_ping(&self, base: &str, success: bool) -> bool {
        self.enqueue(Job::HealthPing {
            url: health_ping_url(base, success),
        })
    }

    /// Push changed settings to every sink.
    pub async fn apply_settings(&self, settings: &Settings) {
        apply_to_sinks(&self.sinks, settings).await;
    }

    /// Apply every update published on `settings` until its sender is
    /// dropped. The task does not keep the notification worker alive.
    pub fn follow_settings(&self, mut settings: watch::Receiver<Settings>) -> JoinHandle<()> {
        let sinks = self.sinks.clone();
        tokio::spawn(async move {
            while settings.changed().await.is_ok() {
                let current = settings.borrow_and_update().clone();
                info!("Notification settings changed, updating channels");
                apply_to_sinks(&sinks, &current).await;
            }
            debug!("Settings watch closed");
        })
    }

    fn enqueue(&self, job: Job) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = job_kind(&job), "Notification queue full, dropping");
                if let Some(m) = &self.metrics {
                    m.record_notification_dropped();
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Notification worker stopped, dropping");
                false
            }
        }
    }
}

async fn apply_to_sinks(sinks: &[Arc<dyn AlertSink>], settings: &Settings) {
    for sink in sinks {
        sink.apply_settings(settings).await;
    }
}

fn job_kind(job: &Job) -> &'static str {
    match job {
        Job::Alert { .. } => "alert",
        Job::HealthPing { .. } => "health_ping",
    }
}

struct Worker {
    rx: mpsc::Receiver<Job>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    pinger: Option<Arc<dyn HealthPinger>>,
    send_timeout: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Worker {
    async fn run(mut self) {
        info!("Notification worker started");

        while let Some(job) = self.rx.recv().await {
            match job {
                Job::Alert { alert, flags } => self.deliver_alert(&alert, flags).await,
                Job::HealthPing { url } => self.deliver_ping(&url).await,
            }
        }

        info!("Notification worker stopped");
    }

    async fn deliver_alert(&self, alert: &Alert, flags: NotifyFlags) {
        for sink in self.sinks.iter() {
            let channel = sink.channel();
            if !channel.selected_by(flags) || !sink.is_enabled().await {
                continue;
            }

            let result = tokio::time::timeout(self.send_timeout, sink.send(alert))
                .await
                .unwrap_or(Err(NotifyError::Timeout(self.send_timeout)));

            match &result {
                Ok(()) => debug!(
                    %channel,
                    host = %alert.host,
                    status = alert.status.as_str(),
                    "Sent notification"
                ),
                Err(e) => warn!(
                    %channel,
                    host = %alert.host,
                    status = alert.status.as_str(),
                    error = %e,
                    "Failed to send notification"
                ),
            }
            if let Some(m) = &self.metrics {
                m.record_notification(channel.as_str(), result.is_ok());
            }
        }
    }

    async fn deliver_ping(&self, url: &str) {
        let Some(pinger) = &self.pinger else {
            return;
        };

        let result = tokio::time::timeout(self.send_timeout, pinger.ping(url))
            .await
            .unwrap_or(Err(NotifyError::Timeout(self.send_timeout)));

        match &result {
            Ok(()) => debug!(url, "Sent health ping"),
            Err(e) => warn!(url, error = %e, "Health ping failed"),
        }
        if let Some(m) = &self.metrics {
            m.record_notification("healthcheck_ping", result.is_ok());
        }
    }
}
