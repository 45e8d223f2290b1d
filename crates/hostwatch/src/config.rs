//! Declarative monitor configuration: hosts, checks and channel settings.
//!
//! The same model is read from and written back to either YAML or TOML; the
//! file extension picks the encoding.

use crate::resolver::find_cycle;
use common::{Error, Result};
use probe::ProbeTarget;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

pub use probe::ProbeKind as CheckType;

/// Expected HTTP status when a check does not set one.
pub const DEFAULT_HTTP_EXPECT: u16 = 200;
/// TCP port used when a check does not set one.
pub const DEFAULT_TCP_PORT: u16 = 80;

/// Text encoding of a persisted config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the encoding from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Yaml => write!(f, "yaml"),
            ConfigFormat::Toml => write!(f, "toml"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One monitored condition attached to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(rename = "type")]
    pub check_type: CheckType,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Unique identifier other checks can depend on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// ID of the parent check whose failure suppresses alerts on this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,

    /// HTTP only; defaults to `http://<address>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP only; defaults to 200
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<u16>,

    /// TCP only; defaults to 80
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub mqtt_notify: bool,

    #[serde(default)]
    pub pushover_notify: bool,

    #[serde(default)]
    pub telegram_notify: bool,
}

/// Per-channel notification switches of a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyFlags {
    pub mqtt: bool,
    pub pushover: bool,
    pub telegram: bool,
}

impl NotifyFlags {
    pub fn any(&self) -> bool {
        self.mqtt || self.pushover || self.telegram
    }
}

/// Dependency and notification options shared by every check type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub id: Option<String>,
    pub depends_on: Option<String>,
    pub notify: NotifyFlags,
}

impl CheckOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
        self.depends_on = Some(parent.into());
        self
    }

    pub fn notify(mut self, notify: NotifyFlags) -> Self {
        self.notify = notify;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CheckConfig {
    fn bare(check_type: CheckType) -> Self {
        Self {
            check_type,
            enabled: true,
            id: None,
            depends_on: None,
            url: None,
            expect: None,
            port: None,
            mqtt_notify: false,
            pushover_notify: false,
            telegram_notify: false,
        }
    }

    /// Enabled ping check with no options.
    pub fn ping() -> Self {
        Self::bare(CheckType::Ping)
    }

    /// Enabled HTTP check. An empty URL means `http://<address>`; an
    /// expected status of 0 means 200.
    pub fn http(url: Option<String>, expect: u16) -> Self {
        Self {
            url: non_empty(url),
            expect: Some(if expect == 0 { DEFAULT_HTTP_EXPECT } else { expect }),
            ..Self::bare(CheckType::Http)
        }
    }

    /// Enabled TCP check. Port 0 means 80.
    pub fn tcp(port: u16) -> Self {
        Self {
            port: Some(if port == 0 { DEFAULT_TCP_PORT } else { port }),
            ..Self::bare(CheckType::Tcp)
        }
    }

    /// Apply id, dependency and notification options.
    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.set_options(options);
        self
    }

    pub fn set_options(&mut self, options: CheckOptions) {
        self.id = non_empty(options.id);
        self.depends_on = non_empty(options.depends_on);
        self.set_notify(options.notify);
    }

    pub fn notify(&self) -> NotifyFlags {
        NotifyFlags {
            mqtt: self.mqtt_notify,
            pushover: self.pushover_notify,
            telegram: self.telegram_notify,
        }
    }

    pub fn set_notify(&mut self, flags: NotifyFlags) {
        self.mqtt_notify = flags.mqtt;
        self.pushover_notify = flags.pushover;
        self.telegram_notify = flags.telegram;
    }

    /// URL probed by an HTTP check on `address`.
    pub fn effective_url(&self, address: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("http://{}", address),
        }
    }

    pub fn effective_expect(&self) -> u16 {
        match self.expect {
            Some(code) if code != 0 => code,
            _ => DEFAULT_HTTP_EXPECT,
        }
    }

    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_TCP_PORT,
        }
    }

    /// Probe target for this check on `address`, with defaults applied.
    pub fn target(&self, address: &str) -> ProbeTarget {
        match self.check_type {
            CheckType::Ping => ProbeTarget::Ping {
                address: address.to_string(),
            },
            CheckType::Http => ProbeTarget::Http {
                url: self.effective_url(address),
                expect: self.effective_expect(),
            },
            CheckType::Tcp => ProbeTarget::Tcp {
                address: address.to_string(),
                port: self.effective_port(),
            },
        }
    }

    /// Short human label, e.g. `http https://example.org` or `tcp :22`.
    pub fn label(&self) -> String {
        match self.check_type {
            CheckType::Ping => "ping".to_string(),
            CheckType::Http => match &self.url {
                Some(url) => format!("http {}", url),
                None => "http".to_string(),
            },
            CheckType::Tcp => format!("tcp :{}", self.effective_port()),
        }
    }

    /// Empty strings and zero values written by hand mean "unset".
    fn normalize(&mut self) {
        self.id = non_empty(self.id.take());
        self.depends_on = non_empty(self.depends_on.take());
        self.url = non_empty(self.url.take());
        self.expect = self.expect.filter(|code| *code != 0);
        self.port = self.port.filter(|port| *port != 0);
    }
}

/// A named network endpoint owning one or more checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,

    pub address: String,

    /// Base URL of an external dead-man's-switch service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthchecks_ping_url: Option<String>,

    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// MQTT broker settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub enabled: bool,
    /// e.g. tcp://localhost:1883
    pub broker: String,
    pub username: String,
    pub password: String,
    /// Base topic, e.g. healthchecker/status
    pub topic: String,
    pub client_id: String,
}

/// Pushover push notification settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverSettings {
    pub enabled: bool,
    pub api_token: String,
    pub user_key: String,
    pub device: String,
    pub sound: String,
}

/// Telegram bot settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub disable_preview: bool,
    pub silent: bool,
}

/// Application-wide notification settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub pushover: PushoverSettings,
    pub telegram: TelegramSettings,
}

/// Root of the monitor configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    /// Load, normalize and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::config(format!("unsupported config extension: {}", path.display()))
        })?;
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents, format)?;
        tracing::info!(
            path = %path.display(),
            %format,
            hosts = config.hosts.len(),
            "Loaded monitor config"
        );
        Ok(config)
    }

    /// Parse, normalize and validate config text.
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        let mut config: Config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(contents)?,
            ConfigFormat::Toml => toml::from_str(contents)?,
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Encode the config in the given format.
    pub fn encode(&self, format: ConfigFormat) -> Result<String> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Toml => toml::to_string(self)?,
        })
    }

    /// Clear blank optional fields and give check-less hosts a ping check.
    pub fn normalize(&mut self) {
        for host in &mut self.hosts {
            host.healthchecks_ping_url = non_empty(host.healthchecks_ping_url.take());
            if host.checks.is_empty() {
                host.checks.push(CheckConfig::ping());
            }
            for check in &mut host.checks {
                check.normalize();
            }
        }
    }

    /// Reject duplicate host names, duplicate check IDs and dependency cycles.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(Error::config("host name must not be empty"));
            }
            if !names.insert(host.name.as_str()) {
                return Err(Error::config(format!("duplicate host name {:?}", host.name)));
            }
        }

        let mut edges: HashMap<&str, &str> = HashMap::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for host in &self.hosts {
            for check in &host.checks {
                let Some(id) = check.id.as_deref() else {
                    continue;
                };
                if let Some(previous) = owners.insert(id, host.name.as_str()) {
                    return Err(Error::config(format!(
                        "duplicate check id {:?} (hosts {:?} and {:?})",
                        id, previous, host.name
                    )));
                }
                if let Some(parent) = check.depends_on.as_deref() {
                    edges.insert(id, parent);
                }
            }
        }

        if let Some(cycle) = find_cycle(&edges) {
            return Err(Error::config(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }
        Ok(())
    }
}
