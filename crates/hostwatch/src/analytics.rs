//! Rolling history buffers and derived uptime/latency analytics.

use crate::config::CheckType;
use crate::status::{CheckState, CheckStatus, DataPoint, HostStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Sparkline buffer capacity.
pub const MAX_LATENCY_HISTORY: usize = 20;
/// Analytics buffer capacity (~2.7 hours at 10s intervals).
pub const MAX_FULL_HISTORY: usize = 1000;
/// Number of most recent results shown in the heatmap.
pub const HEATMAP_SIZE: usize = 60;

/// Health score of an enabled check that has never been evaluated.
const UNKNOWN_HEALTH_SCORE: u32 = 50;

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, cap: usize) {
    buffer.push_back(value);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

impl CheckStatus {
    /// Record one raw probe outcome. Counters are lifetime totals and are
    /// independent of buffer eviction.
    pub fn record_data_point(&mut self, timestamp: DateTime<Utc>, ok: bool, latency_ms: i64) {
        push_bounded(&mut self.latency_history, latency_ms, MAX_LATENCY_HISTORY);
        push_bounded(
            &mut self.full_history,
            DataPoint {
                timestamp,
                ok,
                latency_ms,
            },
            MAX_FULL_HISTORY,
        );

        self.total_checks += 1;
        if ok {
            self.success_checks += 1;
        }
    }

    /// Lifetime uptime percentage, `None` before the first evaluation.
    pub fn uptime(&self) -> Option<f64> {
        (self.total_checks > 0)
            .then(|| self.success_checks as f64 / self.total_checks as f64 * 100.0)
    }
}

/// Latency statistics over successful, positive-latency samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: i64,
    pub max: i64,
    pub p95: i64,
    pub samples: usize,
}

impl LatencyStats {
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a DataPoint>) -> Self {
        let mut latencies: Vec<i64> = history
            .into_iter()
            .filter(|dp| dp.ok && dp.latency_ms > 0)
            .map(|dp| dp.latency_ms)
            .collect();

        if latencies.is_empty() {
            return Self::default();
        }

        latencies.sort_unstable();
        let n = latencies.len();
        let sum: i64 = latencies.iter().sum();
        let p95_index = ((n as f64 * 0.95) as usize).min(n - 1);

        Self {
            avg: sum as f64 / n as f64,
            min: latencies[0],
            max: latencies[n - 1],
            p95: latencies[p95_index],
            samples: n,
        }
    }
}

/// OK flags of the most recent results, oldest first.
pub fn heatmap(history: &VecDeque<DataPoint>) -> Vec<bool> {
    let start = history.len().saturating_sub(HEATMAP_SIZE);
    history.iter().skip(start).map(|dp| dp.ok).collect()
}

/// Detailed analytics for a single check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckAnalytics {
    pub check_type: CheckType,
    pub id: Option<String>,
    pub url: Option<String>,
    pub enabled: bool,
    pub state: CheckState,
    pub ok: bool,
    pub parent_failed: bool,
    pub latency_ms: i64,
    /// Lifetime uptime percentage (0 when never evaluated)
    pub uptime: f64,
    pub latency: LatencyStats,
    pub total_checks: u64,
    pub success_checks: u64,
    pub failed_checks: u64,
    pub history: Vec<DataPoint>,
    pub heatmap: Vec<bool>,
    /// 0-100
    pub health_score: u32,
}

impl CheckAnalytics {
    pub fn from_status(status: &CheckStatus) -> Self {
        let uptime = status.uptime();
        let health_score = match (status.enabled(), uptime) {
            (true, Some(uptime)) => uptime as u32,
            (true, None) => UNKNOWN_HEALTH_SCORE,
            (false, _) => 0,
        };

        Self {
            check_type: status.config.check_type,
            id: status.config.id.clone(),
            url: status.config.url.clone(),
            enabled: status.enabled(),
            state: status.state(),
            ok: status.ok,
            parent_failed: status.parent_failed,
            latency_ms: status.latency_ms,
            uptime: uptime.unwrap_or(0.0),
            latency: LatencyStats::from_history(&status.full_history),
            total_checks: status.total_checks,
            success_checks: status.success_checks,
            failed_checks: status.total_checks - status.success_checks,
            history: status.full_history.iter().copied().collect(),
            heatmap: heatmap(&status.full_history),
            health_score,
        }
    }
}

/// Detailed analytics for a single host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostAnalytics {
    pub name: String,
    pub address: String,
    pub checks: Vec<CheckAnalytics>,
    /// Mean check uptime; never-evaluated checks count as 0
    pub overall_uptime: f64,
    /// Mean check health score, 0-100
    pub health_score: u32,
    pub has_blocked_checks: bool,
}

impl HostAnalytics {
    pub fn from_host(host: &HostStatus) -> Self {
        let checks: Vec<CheckAnalytics> = host.checks.iter().map(CheckAnalytics::from_status).collect();

        let (overall_uptime, health_score) = if checks.is_empty() {
            (0.0, 0)
        } else {
            let n = checks.len();
            let uptime_sum: f64 = checks.iter().map(|c| c.uptime).sum();
            let score_sum: u32 = checks.iter().map(|c| c.health_score).sum();
            (uptime_sum / n as f64, score_sum / n as u32)
        };

        Self {
            name: host.name.clone(),
            address: host.address.clone(),
            has_blocked_checks: checks.iter().any(|c| c.parent_failed),
            checks,
            overall_uptime,
            health_score,
        }
    }
}

/// Overall system health statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_hosts: usize,
    pub total_checks: usize,
    pub checks_up: usize,
    pub checks_down: usize,
    /// Failing only because a parent is down
    pub checks_parent_failed: usize,
    pub checks_disabled: usize,
    pub checks_unknown: usize,
    /// Percentage
    pub overall_uptime: f64,
}

impl AggregateStats {
    pub fn from_hosts(hosts: &[HostStatus]) -> Self {
        let mut stats = Self {
            total_hosts: hosts.len(),
            ..Self::default()
        };
        let mut uptime_sum = 0.0;
        let mut uptime_count = 0usize;

        for check in hosts.iter().flat_map(|h| &h.checks) {
            stats.total_checks += 1;
            if !check.enabled() {
                stats.checks_disabled += 1;
                continue;
            }
            match check.state() {
                CheckState::Unknown => {
                    stats.checks_unknown += 1;
                    continue;
                }
                CheckState::Up => stats.checks_up += 1,
                CheckState::Blocked => stats.checks_parent_failed += 1,
                CheckState::Down => stats.checks_down += 1,
            }
            if let Some(uptime) = check.uptime() {
                uptime_sum += uptime;
                uptime_count += 1;
            }
        }

        stats.overall_uptime = if uptime_count > 0 {
            uptime_sum / uptime_count as f64
        } else if stats.checks_up + stats.checks_down > 0 {
            stats.checks_up as f64 / (stats.checks_up + stats.checks_down) as f64 * 100.0
        } else {
            100.0
        };
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckConfig;
    use chrono::Duration;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[test]
    fn test_buffers_are_bounded_fifo() {
        let mut status = CheckStatus::new(CheckConfig::ping());
        for i in 0..1001 {
            status.record_data_point(ts(i), true, i + 1);
        }

        assert_eq!(status.latency_history.len(), MAX_LATENCY_HISTORY);
        assert_eq!(status.full_history.len(), MAX_FULL_HISTORY);
        assert_eq!(status.total_checks, 1001);
        assert_eq!(status.success_checks, 1001);
        // Oldest evicted first
        assert_eq!(status.full_history.front().unwrap().timestamp, ts(1));
        assert_eq!(status.full_history.back().unwrap().timestamp, ts(1000));
        assert_eq!(status.latency_history.front(), Some(&982));
        assert_eq!(status.latency_history.back(), Some(&1001));
    }

    #[test]
    fn test_uptime_matches_counters() {
        let mut status = CheckStatus::new(CheckConfig::ping());
        assert_eq!(status.uptime(), None);

        for i in 0..7 {
            status.record_data_point(ts(i), i % 3 != 0, 10);
        }
        // 0, 3, 6 fail
        assert_eq!(status.total_checks, 7);
        assert_eq!(status.success_checks, 4);
        assert_eq!(status.uptime(), Some(4.0 / 7.0 * 100.0));
    }

    #[test]
    fn test_latency_stats_ignore_failures_and_zero() {
        let history: Vec<DataPoint> = [(true, 30), (false, 900), (true, 0), (true, 10), (true, 20)]
            .iter()
            .enumerate()
            .map(|(i, (ok, latency_ms))| DataPoint {
                timestamp: ts(i as i64),
                ok: *ok,
                latency_ms: *latency_ms,
            })
            .collect();

        let stats = LatencyStats::from_history(&history);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 30);
        assert_eq!(stats.avg, 20.0);
        // floor(0.95 * 3) = 2
        assert_eq!(stats.p95, 30);
    }

    #[test]
    fn test_p95_index() {
        let history: Vec<DataPoint> = (1..=100)
            .map(|i| DataPoint {
                timestamp: ts(i),
                ok: true,
                latency_ms: i,
            })
            .collect();
        // floor(0.95 * 100) = 95 -> 96th smallest
        assert_eq!(LatencyStats::from_history(&history).p95, 96);
    }

    #[test]
    fn test_latency_stats_empty() {
        assert_eq!(LatencyStats::from_history(&Vec::new()), LatencyStats::default());
    }

    #[test]
    fn test_heatmap_keeps_last_sixty() {
        let mut status = CheckStatus::new(CheckConfig::ping());
        for i in 0..75 {
            status.record_data_point(ts(i), i >= 70, 1);
        }
        let map = heatmap(&status.full_history);
        assert_eq!(map.len(), HEATMAP_SIZE);
        assert_eq!(map.iter().filter(|ok| **ok).count(), 5);
        assert!(map[HEATMAP_SIZE - 1]);
    }

    fn evaluated_host(results: &[&[bool]]) -> HostStatus {
        let checks = results
            .iter()
            .map(|outcomes| {
                let mut status = CheckStatus::new(CheckConfig::ping());
                for (i, ok) in outcomes.iter().enumerate() {
                    status.record_data_point(ts(i as i64), *ok, 5);
                    status.ok = *ok;
                    status.checked_at = Some(ts(i as i64));
                }
                status
            })
            .collect();
        HostStatus {
            name: "h".to_string(),
            address: "10.0.0.1".to_string(),
            health_ping_url: None,
            checks,
        }
    }

    #[test]
    fn test_aggregate_uses_historical_uptime() {
        let hosts = vec![evaluated_host(&[&[true, true], &[true, false]])];
        let stats = AggregateStats::from_hosts(&hosts);
        assert_eq!(stats.total_checks, 2);
        assert_eq!(stats.checks_up, 1);
        assert_eq!(stats.checks_down, 1);
        assert_eq!(stats.overall_uptime, 75.0);
    }

    #[test]
    fn test_aggregate_without_data_is_full_uptime() {
        let hosts = vec![evaluated_host(&[&[], &[]])];
        let stats = AggregateStats::from_hosts(&hosts);
        assert_eq!(stats.checks_unknown, 2);
        assert_eq!(stats.overall_uptime, 100.0);
    }

    #[test]
    fn test_aggregate_falls_back_to_current_ratio() {
        // Evaluated but counters never incremented
        let mut host = evaluated_host(&[&[], &[], &[]]);
        for (i, check) in host.checks.iter_mut().enumerate() {
            check.checked_at = Some(ts(0));
            check.ok = i != 0;
        }
        let stats = AggregateStats::from_hosts(&[host]);
        assert_eq!(stats.checks_up, 2);
        assert_eq!(stats.checks_down, 1);
        assert!((stats.overall_uptime - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_host_analytics_scores() {
        let mut host = evaluated_host(&[&[true, false, true, true], &[]]);
        host.checks[0].parent_failed = true;
        let analytics = HostAnalytics::from_host(&host);

        assert_eq!(analytics.checks[0].uptime, 75.0);
        assert_eq!(analytics.checks[0].failed_checks, 1);
        assert_eq!(analytics.checks[0].health_score, 75);
        // Enabled but never evaluated
        assert_eq!(analytics.checks[1].health_score, 50);
        assert_eq!(analytics.overall_uptime, 37.5);
        assert_eq!(analytics.health_score, 62);
        assert!(analytics.has_blocked_checks);
    }
}
