//! Prometheus metrics for the monitoring engine.

use crate::analytics::AggregateStats;
use crate::config::CheckType;
use crate::transition::TransitionKind;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for check result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    /// Check type (ping, http, tcp)
    pub check_type: String,
    /// Result (up, down, blocked)
    pub result: String,
}

/// Labels for per-type latency metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckTypeLabels {
    pub check_type: String,
}

/// Labels for transition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    /// down or recovered
    pub kind: String,
}

/// Labels for state-based metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateLabels {
    /// up, down, blocked, disabled, unknown
    pub state: String,
}

/// Labels for notification metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NotificationLabels {
    /// Channel name (mqtt, pushover, telegram, healthcheck_ping)
    pub channel: String,
    /// Result (sent, failed)
    pub result: String,
}

/// Metrics registry with all engine metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Probes performed
    checks_total: Family<CheckLabels, Counter>,
    /// Probe latency
    probe_latency_seconds: Family<CheckTypeLabels, Histogram>,
    /// Recorded events
    transitions_total: Family<TransitionLabels, Counter>,
    /// Checks by current state
    checks_by_state: Family<StateLabels, Gauge>,
    /// Evaluation pass duration
    pass_duration_seconds: Histogram,
    /// Notifications delivered or failed
    notifications_total: Family<NotificationLabels, Counter>,
    /// Notifications dropped on a full queue
    notifications_dropped_total: Counter,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "hostwatch_checks",
            "Total probes performed",
            checks_total.clone(),
        );

        let probe_latency_seconds = Family::<CheckTypeLabels, Histogram>::new_with_constructor(|| {
            // 1ms to ~8s
            Histogram::new(exponential_buckets(0.001, 2.0, 14))
        });
        registry.register(
            "hostwatch_probe_latency_seconds",
            "Probe latency in seconds",
            probe_latency_seconds.clone(),
        );

        let transitions_total = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "hostwatch_transitions",
            "Total recorded state-change events",
            transitions_total.clone(),
        );

        let checks_by_state = Family::<StateLabels, Gauge>::default();
        registry.register(
            "hostwatch_checks_by_state",
            "Checks by current state",
            checks_by_state.clone(),
        );

        let pass_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 16));
        registry.register(
            "hostwatch_pass_duration_seconds",
            "Evaluation pass duration",
            pass_duration_seconds.clone(),
        );

        let notifications_total = Family::<NotificationLabels, Counter>::default();
        registry.register(
            "hostwatch_notifications",
            "Total notifications by channel and result",
            notifications_total.clone(),
        );

        let notifications_dropped_total = Counter::default();
        registry.register(
            "hostwatch_notifications_dropped",
            "Notifications dropped because the queue was full",
            notifications_dropped_total.clone(),
        );

        Self {
            registry,
            checks_total,
            probe_latency_seconds,
            transitions_total,
            checks_by_state,
            pass_duration_seconds,
            notifications_total,
            notifications_dropped_total,
        }
    }

    /// Record a probe result
    pub fn record_check(&self, check_type: CheckType, result: &str, latency: Duration) {
        self.checks_total
            .get_or_create(&CheckLabels {
                check_type: check_type.to_string(),
                result: result.to_string(),
            })
            .inc();

        self.probe_latency_seconds
            .get_or_create(&CheckTypeLabels {
                check_type: check_type.to_string(),
            })
            .observe(latency.as_secs_f64());
    }

    pub fn record_transition(&self, kind: TransitionKind) {
        self.transitions_total
            .get_or_create(&TransitionLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    /// Update the per-state gauges from aggregate stats
    pub fn update_checks_by_state(&self, stats: &AggregateStats) {
        for (state, count) in [
            ("up", stats.checks_up),
            ("down", stats.checks_down),
            ("blocked", stats.checks_parent_failed),
            ("disabled", stats.checks_disabled),
            ("unknown", stats.checks_unknown),
        ] {
            self.checks_by_state
                .get_or_create(&StateLabels {
                    state: state.to_string(),
                })
                .set(count as i64);
        }
    }

    pub fn record_pass_duration(&self, duration: Duration) {
        self.pass_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_notification(&self, channel: &str, delivered: bool) {
        self.notifications_total
            .get_or_create(&NotificationLabels {
                channel: channel.to_string(),
                result: if delivered { "sent" } else { "failed" }.to_string(),
            })
            .inc();
    }

    pub fn record_notification_dropped(&self) {
        self.notifications_dropped_total.inc();
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
