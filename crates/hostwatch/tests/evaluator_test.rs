//! Integration tests for evaluation passes: dependency suppression,
//! transitions, analytics and notifications.

mod support;

use chrono::{DateTime, TimeDelta, Utc};
use hostwatch::notify::DEFAULT_SEND_TIMEOUT;
use hostwatch::{
    AlertStatus, AlertSink, CheckConfig, CheckOptions, CheckState, Channel, Config, Dispatcher,
    Evaluator, EventLog, HealthPinger, HostConfig, NotifyFlags, StatusStore, TransitionKind,
};
use std::sync::Arc;
use std::time::Duration;
use support::{RecordingPinger, RecordingSink, ScriptedProber};

const GOOGLE_URL: &str = "https://www.google.com";

/// Internet (ping, id `internet`) and Google (HTTP, depends on `internet`).
fn dependency_config() -> Config {
    Config {
        hosts: vec![
            HostConfig {
                name: "Internet".to_string(),
                address: "1.1.1.1".to_string(),
                healthchecks_ping_url: None,
                checks: vec![CheckConfig::ping().with_options(CheckOptions::default().with_id("internet"))],
            },
            HostConfig {
                name: "Google".to_string(),
                address: "google.com".to_string(),
                healthchecks_ping_url: None,
                checks: vec![CheckConfig::http(Some(GOOGLE_URL.to_string()), 200).with_options(
                    CheckOptions::default()
                        .with_id("google")
                        .depends_on("internet")
                        .notify(NotifyFlags {
                            pushover: true,
                            ..NotifyFlags::default()
                        }),
                )],
            },
        ],
        ..Config::default()
    }
}

fn setup(config: Config) -> (Arc<StatusStore>, Arc<ScriptedProber>, Arc<EventLog>, Evaluator) {
    let store = Arc::new(StatusStore::new(config).unwrap());
    let prober = Arc::new(ScriptedProber::new());
    let events = Arc::new(EventLog::new());
    let evaluator = Evaluator::new(store.clone(), prober.clone(), events.clone());
    (store, prober, events, evaluator)
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1_700_000_000 + secs)
}

async fn state_of(store: &StatusStore, host: &str) -> CheckState {
    store.get_host(host).await.unwrap().checks[0].state()
}

#[tokio::test]
async fn test_parent_failure_blocks_child() {
    let (store, prober, events, evaluator) = setup(dependency_config());

    // Baseline: both up, no events
    let summary = evaluator.run_pass_at(at(0)).await;
    assert_eq!(summary.up, 2);
    assert_eq!(summary.events, 0);

    // Internet drops, Google fails because of it
    prober.set_up("1.1.1.1", false);
    prober.set_up(GOOGLE_URL, false);
    let summary = evaluator.run_pass_at(at(10)).await;
    assert_eq!(summary.down, 1);
    assert_eq!(summary.blocked, 1);
    assert_eq!(state_of(&store, "Internet").await, CheckState::Down);
    assert_eq!(state_of(&store, "Google").await, CheckState::Blocked);

    let google = store.get_host("Google").await.unwrap().checks[0].clone();
    assert_eq!(google.message, "parent check failed");
    assert_eq!(google.latency_ms, 0);

    let recent = events.recent(None).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].host_name, "Internet");
    assert_eq!(recent[0].event_type, TransitionKind::Down);
    assert_eq!(recent[0].message, "no reply");

    // Unchanged outcome: nothing new
    assert_eq!(evaluator.run_pass_at(at(20)).await.events, 0);
    assert_eq!(events.len().await, 1);

    // Internet recovers, Google still failing: masked failure surfaces
    prober.set_up("1.1.1.1", true);
    let summary = evaluator.run_pass_at(at(30)).await;
    assert_eq!(summary.events, 2);
    assert_eq!(state_of(&store, "Google").await, CheckState::Down);

    let recent = events.recent(Some(2)).await;
    let google_down = recent.iter().find(|e| e.host_name == "Google").unwrap();
    assert_eq!(google_down.event_type, TransitionKind::Down);
    assert_eq!(google_down.message, "connection refused");
    let internet_up = recent.iter().find(|e| e.host_name == "Internet").unwrap();
    assert_eq!(internet_up.event_type, TransitionKind::Recovered);
    assert_eq!(internet_up.duration, Some(Duration::from_secs(20)));
    assert_eq!(internet_up.message, "Back up after 20s");

    // Google recovers
    prober.set_up(GOOGLE_URL, true);
    evaluator.run_pass_at(at(45)).await;
    let latest = &events.recent(Some(1)).await[0];
    assert_eq!(latest.host_name, "Google");
    assert_eq!(latest.event_type, TransitionKind::Recovered);
    assert_eq!(latest.duration, Some(Duration::from_secs(15)));

    // Analytics kept the raw outcomes, blocked passes included
    let analytics = store.host_analytics("Google").await.unwrap();
    assert_eq!(analytics.checks[0].total_checks, 5);
    assert_eq!(analytics.checks[0].success_checks, 2);
    assert_eq!(analytics.checks[0].uptime, 40.0);
}

#[tokio::test]
async fn test_entering_blocked_emits_nothing() {
    let (store, prober, events, evaluator) = setup(dependency_config());
    evaluator.run_pass_at(at(0)).await;

    // Only Google fails while the parent is still up: genuine DOWN
    prober.set_up(GOOGLE_URL, false);
    evaluator.run_pass_at(at(10)).await;
    assert_eq!(events.len().await, 1);

    // Now the parent fails as well: Google becomes BLOCKED silently
    prober.set_up("1.1.1.1", false);
    evaluator.run_pass_at(at(20)).await;
    assert_eq!(state_of(&store, "Google").await, CheckState::Blocked);
    let kinds: Vec<_> = events.recent(None).await.iter().map(|e| (e.host_name.clone(), e.event_type)).collect();
    assert_eq!(
        kinds,
        vec![
            ("Internet".to_string(), TransitionKind::Down),
            ("Google".to_string(), TransitionKind::Down),
        ]
    );

    // BLOCKED -> UP is not a recovery
    prober.set_up("1.1.1.1", true);
    prober.set_up(GOOGLE_URL, true);
    evaluator.run_pass_at(at(30)).await;
    let google_events = events
        .recent(None)
        .await
        .into_iter()
        .filter(|e| e.host_name == "Google")
        .count();
    assert_eq!(google_events, 1);
    let google = store.get_host("Google").await.unwrap().checks[0].clone();
    assert_eq!(google.last_up_at, Some(at(30)));
}

#[tokio::test]
async fn test_first_observation_is_baseline() {
    let (_store, prober, events, evaluator) = setup(dependency_config());
    prober.set_up("1.1.1.1", false);

    evaluator.run_pass_at(at(0)).await;
    assert!(events.is_empty().await);
}

#[tokio::test]
async fn test_disabled_checks_are_skipped() {
    let (store, prober, _events, evaluator) = setup(dependency_config());
    store.toggle("Google", 0, false).await.unwrap();

    let summary = evaluator.run_pass_at(at(0)).await;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(prober.calls(), 1);

    let google = store.get_host("Google").await.unwrap().checks[0].clone();
    assert_eq!(google.total_checks, 0);
    assert_eq!(google.state(), CheckState::Unknown);
}

#[tokio::test]
async fn test_http_expect_zero_evaluates_and_persists_as_200() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.yaml");
    std::fs::write(&path, "hosts:\n  - name: nas\n    address: 192.168.1.20\n").unwrap();

    let store = Arc::new(StatusStore::from_file(&path).unwrap());
    let index = store
        .add_http_check("nas", None, 0, CheckOptions::default())
        .await
        .unwrap();
    assert_eq!(index, 1);

    let persisted = Config::load(&path).unwrap();
    assert_eq!(persisted.hosts[0].checks[1].expect, Some(200));

    let prober = Arc::new(ScriptedProber::new());
    let evaluator = Evaluator::new(store.clone(), prober, Arc::new(EventLog::new()));
    evaluator.run_pass_at(at(0)).await;

    let check = store.get_host("nas").await.unwrap().checks[1].clone();
    assert!(check.ok);
    assert_eq!(check.message, "status 200 (expect 200)");
}

#[tokio::test]
async fn test_unexpected_status_is_down() {
    let (store, prober, _events, evaluator) = setup(dependency_config());
    prober.set_status_code(GOOGLE_URL, 503);

    evaluator.run_pass_at(at(0)).await;
    let google = store.get_host("Google").await.unwrap().checks[0].clone();
    assert_eq!(google.state(), CheckState::Down);
    assert_eq!(google.message, "status 503 (expect 200)");
    assert_eq!(google.latency_ms, 12);
}

#[tokio::test]
async fn test_history_bounded_after_1001_passes() {
    let config = Config {
        hosts: vec![HostConfig {
            name: "router".to_string(),
            address: "192.168.1.1".to_string(),
            healthchecks_ping_url: None,
            checks: vec![CheckConfig::ping()],
        }],
        ..Config::default()
    };
    let (store, _prober, _events, evaluator) = setup(config);

    for i in 0..1001 {
        evaluator.run_pass_at(at(i)).await;
    }

    let check = store.get_host("router").await.unwrap().checks[0].clone();
    assert_eq!(check.full_history.len(), 1000);
    assert_eq!(check.latency_history.len(), 20);
    assert_eq!(check.total_checks, 1001);
    assert_eq!(check.success_checks, 1001);
    assert_eq!(check.full_history.front().unwrap().timestamp, at(1));
    assert_eq!(check.uptime(), Some(100.0));
}

#[tokio::test]
async fn test_notifications_and_health_pings() {
    let mut config = dependency_config();
    config.hosts[1].healthchecks_ping_url = Some("https://hc-ping.com/google".to_string());

    let pushover = Arc::new(RecordingSink::new(Channel::Pushover));
    let telegram = Arc::new(RecordingSink::new(Channel::Telegram));
    let pinger = Arc::new(RecordingPinger::default());
    let (dispatcher, worker) = Dispatcher::spawn(
        vec![
            pushover.clone() as Arc<dyn AlertSink>,
            telegram.clone() as Arc<dyn AlertSink>,
        ],
        Some(pinger.clone() as Arc<dyn HealthPinger>),
        64,
        DEFAULT_SEND_TIMEOUT,
        None,
    );

    let store = Arc::new(StatusStore::new(config).unwrap());
    let prober = Arc::new(ScriptedProber::new());
    let evaluator = Evaluator::new(store, prober.clone(), Arc::new(EventLog::new()))
        .with_dispatcher(dispatcher);

    // up (baseline) -> blocked -> down -> up
    evaluator.run_pass_at(at(0)).await;
    prober.set_up("1.1.1.1", false);
    prober.set_up(GOOGLE_URL, false);
    evaluator.run_pass_at(at(10)).await;
    prober.set_up("1.1.1.1", true);
    evaluator.run_pass_at(at(20)).await;
    prober.set_up(GOOGLE_URL, true);
    evaluator.run_pass_at(at(50)).await;

    drop(evaluator);
    worker.await.unwrap();

    let alerts = pushover.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].status, AlertStatus::Down);
    assert_eq!(alerts[0].host, "Google");
    assert_eq!(alerts[0].check_id.as_deref(), Some("google"));
    assert_eq!(alerts[0].check_url.as_deref(), Some(GOOGLE_URL));
    assert_eq!(alerts[1].status, AlertStatus::Up);
    assert_eq!(alerts[1].message, "Back up after 30s");

    // Channel not selected by the check
    assert!(telegram.alerts().is_empty());

    // No ping while blocked
    assert_eq!(
        pinger.urls(),
        vec![
            "https://hc-ping.com/google".to_string(),
            "https://hc-ping.com/google/fail".to_string(),
            "https://hc-ping.com/google".to_string(),
        ]
    );
}
