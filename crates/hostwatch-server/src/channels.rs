//! Notification channel sinks and the health-ping client.
//!
//! Each sink keeps its own copy of the channel settings behind a lock so the
//! dispatcher can push settings changes without rebuilding the sink.

use async_trait::async_trait;
use hostwatch::config::{PushoverSettings, TelegramSettings};
use hostwatch::{Alert, AlertSink, AlertStatus, Channel, HealthPinger, NotifyError, Settings};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(5);

const PRIORITY_NORMAL: i8 = 0;
const PRIORITY_HIGH: i8 = 1;

/// Characters Telegram MarkdownV2 treats as markup.
const MARKDOWN_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

fn transport(e: reqwest::Error) -> NotifyError {
    NotifyError::Transport(e.to_string())
}

/// Pushover push notifications.
pub struct PushoverSink {
    http: reqwest::Client,
    endpoint: String,
    settings: RwLock<PushoverSettings>,
}

impl PushoverSink {
    pub fn new(http: reqwest::Client, settings: PushoverSettings) -> Self {
        Self {
            http,
            endpoint: PUSHOVER_API_URL.to_string(),
            settings: RwLock::new(settings),
        }
    }

    /// Post to a different messages endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn pushover_configured(settings: &PushoverSettings) -> bool {
    settings.enabled && !settings.user_key.is_empty() && !settings.api_token.is_empty()
}

/// Form fields of a Pushover message for `alert`.
pub(crate) fn pushover_form(settings: &PushoverSettings, alert: &Alert) -> Vec<(&'static str, String)> {
    let (title, priority, default_sound) = match alert.status {
        AlertStatus::Down => (format!("🔴 {} is DOWN", alert.host), PRIORITY_HIGH, "falling"),
        AlertStatus::Up => (format!("✅ {} is UP", alert.host), PRIORITY_NORMAL, "pushover"),
    };

    let mut body = format!(
        "Host: {} ({})\nCheck: {}",
        alert.host,
        alert.address,
        alert.check_type.as_str().to_uppercase()
    );
    if let Some(id) = &alert.check_id {
        body.push_str(&format!(" [{}]", id));
    }
    if !alert.message.is_empty() {
        body.push('\n');
        body.push_str(&alert.message);
    }
    if alert.status == AlertStatus::Up && alert.latency_ms > 0 {
        body.push_str(&format!("\nLatency: {}ms", alert.latency_ms));
    }

    let sound = if settings.sound.is_empty() {
        default_sound.to_string()
    } else {
        settings.sound.clone()
    };

    let mut form = vec![
        ("token", settings.api_token.clone()),
        ("user", settings.user_key.clone()),
        ("title", title),
        ("message", body),
        ("priority", priority.to_string()),
        ("sound", sound),
    ];
    if !settings.device.is_empty() {
        form.push(("device", settings.device.clone()));
    }
    form
}

#[async_trait]
impl AlertSink for PushoverSink {
    fn channel(&self) -> Channel {
        Channel::Pushover
    }

    async fn is_enabled(&self) -> bool {
        pushover_configured(&*self.settings.read().await)
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let settings = self.settings.read().await.clone();
        if !pushover_configured(&settings) {
            return Err(NotifyError::NotConfigured);
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .form(&pushover_form(&settings, alert))
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(host = %alert.host, status = alert.status.as_str(), "Pushover notification sent");
        Ok(())
    }

    async fn apply_settings(&self, settings: &Settings) {
        *self.settings.write().await = settings.pushover.clone();
    }
}

/// Telegram bot messages.
pub struct TelegramSink {
    http: reqwest::Client,
    api_base: String,
    settings: RwLock<TelegramSettings>,
}

impl TelegramSink {
    pub fn new(http: reqwest::Client, settings: TelegramSettings) -> Self {
        Self {
            http,
            api_base: TELEGRAM_API_URL.to_string(),
            settings: RwLock::new(settings),
        }
    }

    /// Talk to a different Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

fn telegram_configured(settings: &TelegramSettings) -> bool {
    settings.enabled && !settings.bot_token.is_empty() && !settings.chat_id.is_empty()
}

/// Escape MarkdownV2 markup characters.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// MarkdownV2 message text for `alert`.
pub(crate) fn telegram_text(alert: &Alert) -> String {
    let host = escape_markdown(&alert.host);
    let mut text = match alert.status {
        AlertStatus::Down => format!("🔴 *{} is DOWN*\n\n", host),
        AlertStatus::Up => format!("✅ *{} is UP*\n\n", host),
    };

    text.push_str(&format!(
        "*Host:* {} \\({}\\)\n",
        host,
        escape_markdown(&alert.address)
    ));
    text.push_str(&format!("*Check:* {}", alert.check_type.as_str().to_uppercase()));
    if let Some(id) = &alert.check_id {
        text.push_str(&format!(" \\[{}\\]", escape_markdown(id)));
    }
    text.push('\n');

    if !alert.message.is_empty() {
        text.push_str(&format!("*Details:* {}\n", escape_markdown(&alert.message)));
    }
    if alert.status == AlertStatus::Up && alert.latency_ms > 0 {
        text.push_str(&format!("*Latency:* {}ms\n", alert.latency_ms));
    }
    text
}

pub(crate) fn telegram_form(settings: &TelegramSettings, alert: &Alert) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("chat_id", settings.chat_id.clone()),
        ("text", telegram_text(alert)),
        ("parse_mode", "MarkdownV2".to_string()),
    ];
    if settings.disable_preview {
        form.push(("disable_web_page_preview", "true".to_string()));
    }
    if settings.silent {
        form.push(("disable_notification", "true".to_string()));
    }
    form
}

/// Error body returned by the Bot API.
#[derive(Debug, Default, Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    description: String,
}

#[async_trait]
impl AlertSink for TelegramSink {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn is_enabled(&self) -> bool {
        telegram_configured(&*self.settings.read().await)
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let settings = self.settings.read().await.clone();
        if !telegram_configured(&settings) {
            return Err(NotifyError::NotConfigured);
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, settings.bot_token);
        let resp = self
            .http
            .post(&url)
            .form(&telegram_form(&settings, alert))
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let description = resp
                .json::<TelegramResponse>()
                .await
                .unwrap_or_default()
                .description;
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: description,
            });
        }

        info!(host = %alert.host, status = alert.status.as_str(), "Telegram notification sent");
        Ok(())
    }

    async fn apply_settings(&self, settings: &Settings) {
        *self.settings.write().await = settings.telegram.clone();
    }
}

/// Plain GET pinger for healthchecks.io style endpoints.
pub struct HttpHealthPinger {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthPinger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: HEALTH_PING_TIMEOUT,
        }
    }
}

#[async_trait]
impl HealthPinger for HttpHealthPinger {
    async fn ping(&self, url: &str) -> Result<(), NotifyError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        debug!(url, "Health ping delivered");
        Ok(())
    }
}
