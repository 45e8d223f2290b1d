//! One evaluation pass over every enabled check.

use crate::analytics::AggregateStats;
use crate::config::CheckType;
use crate::events::EventLog;
use crate::metrics::MetricsRegistry;
use crate::notify::{Alert, AlertStatus, Dispatcher};
use crate::resolver::DependencyResolver;
use crate::status::{CheckKey, CheckState, CheckStatus};
use crate::store::StatusStore;
use crate::transition::{recovery_message, Event, Transition, TransitionKind};
use chrono::{DateTime, Utc};
use probe::{ProbeOutcome, ProbeTarget, Prober};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Message shown while a failure is masked by a parent.
pub const BLOCKED_MESSAGE: &str = "parent check failed";

/// Counts from a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub checked: usize,
    pub skipped: usize,
    pub up: usize,
    pub down: usize,
    pub blocked: usize,
    pub events: usize,
}

/// Probes checks, classifies results and emits events and notifications.
pub struct Evaluator {
    store: Arc<StatusStore>,
    prober: Arc<dyn Prober>,
    events: Arc<EventLog>,
    dispatcher: Option<Dispatcher>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Evaluator {
    pub fn new(store: Arc<StatusStore>, prober: Arc<dyn Prober>, events: Arc<EventLog>) -> Self {
        Self {
            store,
            prober,
            events,
            dispatcher: None,
            metrics: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub async fn run_pass(&self) -> PassSummary {
        self.run_pass_at(Utc::now()).await
    }

    /// Evaluate every enabled check as of `now`.
    ///
    /// The store's write lock is held for the whole pass, so admin mutations
    /// wait until the pass completes.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> PassSummary {
        let started = Instant::now();
        let mut summary = PassSummary::default();
        let mut state = self.store.lock().await;

        for h in 0..state.hosts.len() {
            for c in 0..state.hosts[h].checks.len() {
                let key = CheckKey::new(h, c);
                if !state.hosts[h].checks[c].enabled() {
                    summary.skipped += 1;
                    continue;
                }

                let parent_ok = DependencyResolver::new(&state.hosts, &state.parents).is_healthy(key);
                let host = &state.hosts[h];
                let check = &host.checks[c];
                let target = check.config.target(&host.address);
                let pre = check.state();

                let outcome = self.prober.probe(&target, target.kind().timeout()).await;

                let host = &mut state.hosts[h];
                let (host_name, address, ping_url) =
                    (host.name.clone(), host.address.clone(), host.health_ping_url.clone());
                let status = &mut host.checks[c];

                apply_outcome(status, &target, &outcome, parent_ok, now);
                status.record_data_point(now, outcome.ok, status.latency_ms);
                let post = status.state();

                debug!(
                    host = %host_name,
                    check = c,
                    target = %target,
                    state = %post,
                    latency_ms = status.latency_ms,
                    message = %status.message,
                    "Probe finished"
                );

                summary.checked += 1;
                match post {
                    CheckState::Up => summary.up += 1,
                    CheckState::Down => summary.down += 1,
                    CheckState::Blocked => summary.blocked += 1,
                    CheckState::Unknown => {}
                }
                if let Some(m) = &self.metrics {
                    let result = match post {
                        CheckState::Up => "up",
                        CheckState::Blocked => "blocked",
                        _ => "down",
                    };
                    m.record_check(status.config.check_type, result, outcome.latency);
                }

                if let Some(transition) = Transition::observe(pre, status, now) {
                    summary.events += 1;
                    let event = Event {
                        timestamp: now,
                        host_name: host_name.clone(),
                        check_index: c,
                        check_id: status.config.id.clone(),
                        check_type: status.config.check_type,
                        event_type: transition.kind,
                        message: match transition.duration {
                            Some(duration) => recovery_message(duration),
                            None => status.message.clone(),
                        },
                        duration: transition.duration,
                    };
                    if let Some(m) = &self.metrics {
                        m.record_transition(transition.kind);
                    }
                    if let Some(dispatcher) = &self.dispatcher {
                        dispatcher.alert(alert_for(&host_name, &address, status, &transition, now), status.config.notify());
                    }
                    self.events.record(event).await;
                }

                if let (Some(dispatcher), Some(url)) = (&self.dispatcher, &ping_url) {
                    match post {
                        CheckState::Up => {
                            dispatcher.health_ping(url, true);
                        }
                        CheckState::Down => {
                            dispatcher.health_ping(url, false);
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.update_checks_by_state(&AggregateStats::from_hosts(&state.hosts));
            m.record_pass_duration(started.elapsed());
        }
        drop(state);

        info!(
            checked = summary.checked,
            up = summary.up,
            down = summary.down,
            blocked = summary.blocked,
            events = summary.events,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation pass complete"
        );
        summary
    }
}

/// Write the classified outcome into the runtime fields of `status`.
fn apply_outcome(
    status: &mut CheckStatus,
    target: &ProbeTarget,
    outcome: &ProbeOutcome,
    parent_ok: bool,
    now: DateTime<Utc>,
) {
    status.checked_at = Some(now);
    status.ok = outcome.ok;

    if outcome.ok {
        status.parent_failed = false;
        status.latency_ms = outcome.latency_ms();
        status.message = success_message(target, outcome);
    } else if !parent_ok {
        status.parent_failed = true;
        status.latency_ms = 0;
        status.message = BLOCKED_MESSAGE.to_string();
    } else {
        status.parent_failed = false;
        // An HTTP failure with a response still measured a round trip
        status.latency_ms = match outcome.status_code {
            Some(_) => outcome.latency_ms(),
            None => 0,
        };
        status.message = failure_message(target, outcome);
    }
}

fn success_message(target: &ProbeTarget, outcome: &ProbeOutcome) -> String {
    match target {
        ProbeTarget::Ping { .. } => "pong".to_string(),
        ProbeTarget::Http { expect, .. } => {
            format!("status {} (expect {})", outcome.status_code.unwrap_or(*expect), expect)
        }
        ProbeTarget::Tcp { port, .. } => format!("port {} open", port),
    }
}

fn failure_message(target: &ProbeTarget, outcome: &ProbeOutcome) -> String {
    if let Some(error) = &outcome.error {
        return error.clone();
    }
    match target {
        ProbeTarget::Ping { .. } => "no reply".to_string(),
        ProbeTarget::Http { expect, .. } => match outcome.status_code {
            Some(code) => format!("status {} (expect {})", code, expect),
            None => "no response".to_string(),
        },
        ProbeTarget::Tcp { port, .. } => format!("port {} closed", port),
    }
}

fn alert_for(
    host: &str,
    address: &str,
    status: &CheckStatus,
    transition: &Transition,
    now: DateTime<Utc>,
) -> Alert {
    let check_url = match status.config.check_type {
        CheckType::Http => Some(status.config.effective_url(address)),
        _ => None,
    };
    let (alert_status, message) = match transition.kind {
        TransitionKind::Down => (AlertStatus::Down, status.message.clone()),
        TransitionKind::Recovered => (
            AlertStatus::Up,
            recovery_message(transition.duration.unwrap_or_default()),
        ),
    };

    Alert {
        host: host.to_string(),
        address: address.to_string(),
        check_type: status.config.check_type,
        check_id: status.config.id.clone(),
        check_url,
        status: alert_status,
        message,
        latency_ms: status.latency_ms,
        timestamp: now,
    }
}
