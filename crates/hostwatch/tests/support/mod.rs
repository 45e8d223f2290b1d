//! Scripted probes and recording sinks shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use hostwatch::{Alert, AlertSink, Channel, HealthPinger, NotifyError, Settings};
use probe::{ProbeOutcome, ProbeTarget, Prober};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Key a scripted result is looked up by: the address for ping, the URL for
/// HTTP and `address:port` for TCP.
pub fn target_key(target: &ProbeTarget) -> String {
    match target {
        ProbeTarget::Ping { address } => address.clone(),
        ProbeTarget::Http { url, .. } => url.clone(),
        ProbeTarget::Tcp { address, port } => format!("{}:{}", address, port),
    }
}

/// Prober answering from a script. Unscripted targets succeed; HTTP
/// targets answer with the scripted status code (200 by default).
#[derive(Default)]
pub struct ScriptedProber {
    down: Mutex<HashMap<String, bool>>,
    codes: Mutex<HashMap<String, u16>>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_up(&self, key: &str, up: bool) {
        self.down.lock().unwrap().insert(key.to_string(), !up);
    }

    pub fn set_status_code(&self, url: &str, code: u16) {
        self.codes.lock().unwrap().insert(url.to_string(), code);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &ProbeTarget, _timeout: Duration) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = target_key(target);
        let down = self.down.lock().unwrap().get(&key).copied().unwrap_or(false);
        let latency = Duration::from_millis(12);

        match target {
            ProbeTarget::Http { expect, .. } => {
                if down {
                    return ProbeOutcome::failure(Duration::ZERO, "connection refused");
                }
                let code = self.codes.lock().unwrap().get(&key).copied().unwrap_or(200);
                ProbeOutcome::http(code, *expect, latency)
            }
            _ if down => ProbeOutcome::silent_failure(Duration::ZERO),
            _ => ProbeOutcome::success(latency),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Sink recording every alert it is asked to send.
pub struct RecordingSink {
    channel: Channel,
    enabled: bool,
    pub alerts: Mutex<Vec<Alert>>,
    pub settings_applied: AtomicUsize,
    pub last_settings: Mutex<Option<Settings>>,
}

impl RecordingSink {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            enabled: true,
            alerts: Mutex::new(Vec::new()),
            settings_applied: AtomicUsize::new(0),
            last_settings: Mutex::new(None),
        }
    }

    pub fn disabled(channel: Channel) -> Self {
        Self {
            enabled: false,
            ..Self::new(channel)
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn apply_settings(&self, settings: &Settings) {
        self.settings_applied.fetch_add(1, Ordering::SeqCst);
        *self.last_settings.lock().unwrap() = Some(settings.clone());
    }
}

/// Pinger recording every URL it was asked to hit.
#[derive(Default)]
pub struct RecordingPinger {
    pub urls: Mutex<Vec<String>>,
}

impl RecordingPinger {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthPinger for RecordingPinger {
    async fn ping(&self, url: &str) -> Result<(), NotifyError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
