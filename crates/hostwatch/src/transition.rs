//! State-change detection between two observations of a check.

use crate::config::CheckType;
use crate::status::{CheckState, CheckStatus};
use chrono::{DateTime, Utc};
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of a recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Down,
    Recovered,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Down => "down",
            TransitionKind::Recovered => "recovered",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a `pre -> post` state change.
///
/// The first observation is a baseline and entering BLOCKED is silent. A
/// failure that was masked by a parent surfaces as `Down` once the parent
/// is healthy again, and only a genuine DOWN can recover.
pub fn classify(pre: CheckState, post: CheckState) -> Option<TransitionKind> {
    use CheckState::*;

    match (pre, post) {
        (Unknown, _) | (_, Blocked) | (_, Unknown) => None,
        (Up, Down) | (Blocked, Down) => Some(TransitionKind::Down),
        (Down, Up) => Some(TransitionKind::Recovered),
        _ => None,
    }
}

/// A detected transition, with the outage length for recoveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration: Option<Duration>,
}

impl Transition {
    /// Detect the transition from `pre` to the current state of `status`,
    /// stamping `last_down_at` / `last_up_at` as a side effect.
    pub fn observe(pre: CheckState, status: &mut CheckStatus, now: DateTime<Utc>) -> Option<Self> {
        let post = status.state();
        let kind = classify(pre, post);

        match post {
            CheckState::Down if kind.is_some() || pre == CheckState::Unknown => {
                status.last_down_at = Some(now);
            }
            CheckState::Up if pre != CheckState::Up && pre != CheckState::Unknown => {
                status.last_up_at = Some(now);
            }
            _ => {}
        }

        let kind = kind?;
        let duration = match kind {
            TransitionKind::Down => None,
            TransitionKind::Recovered => Some(
                status
                    .last_down_at
                    .and_then(|down| (now - down).to_std().ok())
                    .unwrap_or(Duration::ZERO),
            ),
        };
        Some(Self { kind, duration })
    }
}

/// Entry of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub host_name: String,
    pub check_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
    pub check_type: CheckType,
    pub event_type: TransitionKind,
    pub message: String,
    /// Outage length, recoveries only
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

/// `Back up after 5m 3s`, rounded to whole seconds.
pub fn recovery_message(duration: Duration) -> String {
    let rounded = Duration::from_secs((duration.as_millis() as u64 + 500) / 1000);
    format!("Back up after {}", humantime::format_duration(rounded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckConfig;
    use chrono::TimeDelta;

    #[test]
    fn test_classify_table() {
        use CheckState::*;

        for post in [Up, Down, Blocked] {
            assert_eq!(classify(Unknown, post), None, "baseline into {}", post);
        }
        for pre in [Up, Down, Blocked] {
            assert_eq!(classify(pre, Blocked), None, "{} into BLOCKED", pre);
        }
        assert_eq!(classify(Up, Down), Some(TransitionKind::Down));
        assert_eq!(classify(Blocked, Down), Some(TransitionKind::Down));
        assert_eq!(classify(Down, Up), Some(TransitionKind::Recovered));

        // Masked failures never recover and repeated states are silent
        assert_eq!(classify(Blocked, Up), None);
        assert_eq!(classify(Up, Up), None);
        assert_eq!(classify(Down, Down), None);
    }

    fn observed(ok: bool, parent_failed: bool, at: DateTime<Utc>) -> CheckStatus {
        let mut status = CheckStatus::new(CheckConfig::ping());
        status.ok = ok;
        status.parent_failed = parent_failed;
        status.checked_at = Some(at);
        status
    }

    fn set(status: &mut CheckStatus, ok: bool, parent_failed: bool, at: DateTime<Utc>) -> CheckState {
        let pre = status.state();
        status.ok = ok;
        status.parent_failed = parent_failed;
        status.checked_at = Some(at);
        pre
    }

    #[test]
    fn test_down_then_recovered_duration() {
        let t0 = Utc::now();
        let mut status = observed(true, false, t0);

        let t1 = t0 + TimeDelta::seconds(30);
        let pre = set(&mut status, false, false, t1);
        let down = Transition::observe(pre, &mut status, t1).unwrap();
        assert_eq!(down.kind, TransitionKind::Down);
        assert_eq!(status.last_down_at, Some(t1));

        let t2 = t1 + TimeDelta::seconds(95);
        let pre = set(&mut status, true, false, t2);
        let up = Transition::observe(pre, &mut status, t2).unwrap();
        assert_eq!(up.kind, TransitionKind::Recovered);
        assert_eq!(up.duration, Some(Duration::from_secs(95)));
        assert_eq!(status.last_up_at, Some(t2));
    }

    #[test]
    fn test_baseline_down_stamps_last_down() {
        let t0 = Utc::now();
        let mut status = CheckStatus::new(CheckConfig::ping());
        let pre = set(&mut status, false, false, t0);
        assert_eq!(Transition::observe(pre, &mut status, t0), None);
        assert_eq!(status.last_down_at, Some(t0));
    }

    #[test]
    fn test_blocked_to_up_is_silent_but_stamped() {
        let t0 = Utc::now();
        let mut status = observed(false, true, t0);
        let t1 = t0 + TimeDelta::seconds(10);
        let pre = set(&mut status, true, false, t1);
        assert_eq!(Transition::observe(pre, &mut status, t1), None);
        assert_eq!(status.last_up_at, Some(t1));
        assert_eq!(status.last_down_at, None);
    }

    #[test]
    fn test_unmasked_failure_stamps_down() {
        let t0 = Utc::now();
        let mut status = observed(false, true, t0);
        let t1 = t0 + TimeDelta::seconds(10);
        let pre = set(&mut status, false, false, t1);
        let t = Transition::observe(pre, &mut status, t1).unwrap();
        assert_eq!(t.kind, TransitionKind::Down);
        assert_eq!(status.last_down_at, Some(t1));
    }

    #[test]
    fn test_recovery_message() {
        assert_eq!(recovery_message(Duration::from_millis(95_400)), "Back up after 1m 35s");
        assert_eq!(recovery_message(Duration::ZERO), "Back up after 0s");
    }

    #[test]
    fn test_event_json_fields() {
        let event = Event {
            timestamp: Utc::now(),
            host_name: "nas".to_string(),
            check_index: 1,
            check_id: None,
            check_type: CheckType::Tcp,
            event_type: TransitionKind::Recovered,
            message: recovery_message(Duration::from_secs(65)),
            duration: Some(Duration::from_secs(65)),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "recovered");
        assert_eq!(json["duration"], "1m 5s");
        assert!(json.get("kind").is_none());
        assert!(json.get("check_id").is_none());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type, TransitionKind::Recovered);
    }
}
