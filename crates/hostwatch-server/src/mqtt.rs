//! MQTT state-change publisher.
//!
//! One broker connection is kept per settings generation. The connection is
//! rebuilt when the broker, credentials, client id or the enabled flag
//! change; alerts published while the broker is unreachable are dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostwatch::config::MqttSettings;
use hostwatch::{Alert, AlertSink, AlertStatus, Channel, CheckType, NotifyError, Settings};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "hostwatch/status";
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

/// Split `tcp://host:port`, `mqtt://host:port` or `host[:port]`.
pub fn parse_broker(broker: &str) -> Option<(String, u16)> {
    let rest = broker.trim();
    let rest = rest
        .strip_prefix("tcp://")
        .or_else(|| rest.strip_prefix("mqtt://"))
        .unwrap_or(rest)
        .trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }

    match rest.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
            Some((host.to_string(), port))
        }
        Some(_) => None,
        None => Some((rest.to_string(), DEFAULT_MQTT_PORT)),
    }
}

/// `<base>/<host>/<check id>`, or the check type when the check has no id.
pub fn mqtt_topic(base: &str, alert: &Alert) -> String {
    let base = base.trim().trim_end_matches('/');
    let base = if base.is_empty() { DEFAULT_TOPIC } else { base };
    let leaf = alert.check_id.as_deref().unwrap_or(alert.check_type.as_str());
    format!("{}/{}/{}", base, alert.host, leaf)
}

/// JSON body of a published state change.
#[derive(Debug, Serialize)]
pub(crate) struct StateChangeMessage<'a> {
    timestamp: DateTime<Utc>,
    host: &'a str,
    address: &'a str,
    check_type: CheckType,
    #[serde(skip_serializing_if = "Option::is_none")]
    check_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check_id: Option<&'a str>,
    status: AlertStatus,
    #[serde(skip_serializing_if = "is_zero")]
    latency_ms: i64,
    #[serde(skip_serializing_if = "is_blank")]
    message: &'a str,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

impl<'a> From<&'a Alert> for StateChangeMessage<'a> {
    fn from(alert: &'a Alert) -> Self {
        Self {
            timestamp: alert.timestamp,
            host: &alert.host,
            address: &alert.address,
            check_type: alert.check_type,
            check_url: alert.check_url.as_deref(),
            check_id: alert.check_id.as_deref(),
            status: alert.status,
            latency_ms: alert.latency_ms,
            message: &alert.message,
        }
    }
}

fn mqtt_configured(settings: &MqttSettings) -> bool {
    settings.enabled && !settings.broker.trim().is_empty()
}

/// Settings whose change requires a new broker session.
fn needs_reconnect(old: &MqttSettings, new: &MqttSettings) -> bool {
    old.enabled != new.enabled
        || old.broker != new.broker
        || old.username != new.username
        || old.password != new.password
        || old.client_id != new.client_id
}

fn client_id(settings: &MqttSettings) -> String {
    let id = settings.client_id.trim();
    if id.is_empty() {
        format!("hostwatch-{}", std::process::id())
    } else {
        id.to_string()
    }
}

/// Live broker session. Dropping it stops the event loop.
struct MqttConnection {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MqttConnection {
    fn open(settings: &MqttSettings) -> Result<Self, NotifyError> {
        let (host, port) = parse_broker(&settings.broker).ok_or_else(|| {
            NotifyError::Transport(format!("invalid broker address {:?}", settings.broker))
        })?;

        let mut options = MqttOptions::new(client_id(settings), host.clone(), port);
        options.set_keep_alive(KEEP_ALIVE);
        if !settings.username.is_empty() {
            options.set_credentials(settings.username.clone(), settings.password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(drive(eventloop, connected.clone(), format!("{}:{}", host, port)));

        Ok(Self {
            client,
            connected,
            task,
        })
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll the event loop forever; rumqttc reconnects on the next poll after
/// an error.
async fn drive(mut eventloop: EventLoop, connected: Arc<AtomicBool>, broker: String) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                info!(broker = %broker, "Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!(broker = %broker, error = %e, "MQTT connection lost");
                } else {
                    debug!(broker = %broker, error = %e, "MQTT connect failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

struct MqttState {
    settings: MqttSettings,
    connection: Option<MqttConnection>,
}

/// Publishes every alert to `<topic>/<host>/<check>` at QoS 0, not retained.
pub struct MqttSink {
    state: RwLock<MqttState>,
}

impl MqttSink {
    /// Build the sink. No connection is opened until settings enabling MQTT
    /// are applied.
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            state: RwLock::new(MqttState {
                settings,
                connection: None,
            }),
        }
    }

    /// A broker session is up.
    pub async fn is_connected(&self) -> bool {
        self.state
            .read()
            .await
            .connection
            .as_ref()
            .is_some_and(|c| c.connected.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl AlertSink for MqttSink {
    fn channel(&self) -> Channel {
        Channel::Mqtt
    }

    async fn is_enabled(&self) -> bool {
        mqtt_configured(&self.state.read().await.settings)
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let state = self.state.read().await;
        if !mqtt_configured(&state.settings) {
            return Err(NotifyError::NotConfigured);
        }
        let connection = state
            .connection
            .as_ref()
            .filter(|c| c.connected.load(Ordering::SeqCst))
            .ok_or_else(|| NotifyError::Transport("not connected to broker".to_string()))?;

        let topic = mqtt_topic(&state.settings.topic, alert);
        let payload = serde_json::to_vec(&StateChangeMessage::from(alert))
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        connection
            .client
            .try_publish(topic.clone(), QoS::AtMostOnce, false, payload)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!(topic = %topic, status = alert.status.as_str(), "MQTT state change published");
        Ok(())
    }

    async fn apply_settings(&self, settings: &Settings) {
        let new = &settings.mqtt;
        let mut state = self.state.write().await;
        let reconnect = state.connection.is_none() || needs_reconnect(&state.settings, new);
        state.settings = new.clone();
        if !reconnect {
            return;
        }

        // Closes the previous session, if any
        state.connection = None;
        if !mqtt_configured(new) {
            return;
        }
        match MqttConnection::open(new) {
            Ok(connection) => {
                info!(broker = %new.broker, "Connecting to MQTT broker");
                state.connection = Some(connection);
            }
            Err(e) => warn!(error = %e, "MQTT disabled"),
        }
    }
}
