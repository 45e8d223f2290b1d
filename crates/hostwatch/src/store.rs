//! Authoritative, lock-protected status store.
//!
//! Each check's runtime status owns its declarative [`CheckConfig`], so the
//! persisted [`Config`] is always derived from the same vector the evaluator
//! walks. Every mutation runs inside one write-locked critical section:
//! validate, apply, rebuild the ID index, persist.

use crate::analytics::{AggregateStats, HostAnalytics};
use crate::config::{
    CheckConfig, CheckOptions, CheckType, Config, HostConfig, MqttSettings, PushoverSettings,
    Settings, TelegramSettings,
};
use crate::persist::ConfigPersister;
use crate::resolver::find_cycle;
use crate::status::{CheckKey, CheckStatus, HostStatus};
use common::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{RwLock, RwLockWriteGuard, watch};
use tracing::{info, warn};

/// State guarded by the store lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) hosts: Vec<HostStatus>,
    /// Check ID -> position
    ids: HashMap<String, CheckKey>,
    /// Check -> parent check, for resolvable `depends_on` references only
    pub(crate) parents: HashMap<CheckKey, CheckKey>,
    settings: Settings,
    persister: ConfigPersister,
}

impl StoreState {
    fn new(config: Config, persister: ConfigPersister) -> Self {
        let mut state = Self {
            hosts: config.hosts.into_iter().map(HostStatus::from_config).collect(),
            ids: HashMap::new(),
            parents: HashMap::new(),
            settings: config.settings,
            persister,
        };
        state.rebuild_index();
        state
    }

    fn rebuild_index(&mut self) {
        self.ids.clear();
        for (h, host) in self.hosts.iter().enumerate() {
            for (c, check) in host.checks.iter().enumerate() {
                if let Some(id) = &check.config.id {
                    self.ids.entry(id.clone()).or_insert(CheckKey::new(h, c));
                }
            }
        }

        self.parents.clear();
        for (h, host) in self.hosts.iter().enumerate() {
            for (c, check) in host.checks.iter().enumerate() {
                let parent = check
                    .config
                    .depends_on
                    .as_ref()
                    .and_then(|id| self.ids.get(id));
                if let Some(&parent) = parent {
                    self.parents.insert(CheckKey::new(h, c), parent);
                }
            }
        }
    }

    fn config(&self) -> Config {
        Config {
            hosts: self.hosts.iter().map(HostStatus::to_config).collect(),
            settings: self.settings.clone(),
        }
    }

    fn persist(&self) -> Result<()> {
        self.persister.save(&self.config()).inspect_err(|e| {
            warn!(error = %e, "Failed to persist monitor config");
        })
    }

    fn host_index(&self, name: &str) -> Result<usize> {
        self.hosts
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| Error::not_found(format!("host {:?}", name)))
    }

    fn check_key(&self, host: &str, index: usize) -> Result<CheckKey> {
        let h = self.host_index(host)?;
        let len = self.hosts[h].checks.len();
        if index >= len {
            return Err(Error::InvalidIndex {
                host: host.to_string(),
                index,
                len,
            });
        }
        Ok(CheckKey::new(h, index))
    }

    fn check_mut(&mut self, key: CheckKey) -> &mut CheckStatus {
        &mut self.hosts[key.host].checks[key.check]
    }

    /// Reject `candidate` at `key` (or appended when `None`) if its ID is
    /// taken by another check or its dependency closes a cycle.
    fn validate_candidate(&self, key: Option<CheckKey>, candidate: &CheckConfig) -> Result<()> {
        if let Some(id) = &candidate.id {
            if let Some(existing) = self.ids.get(id) {
                if Some(*existing) != key {
                    return Err(Error::conflict(format!(
                        "check id {:?} already used on host {:?}",
                        id, self.hosts[existing.host].name
                    )));
                }
            }
        }

        let mut edges: HashMap<&str, &str> = HashMap::new();
        for (h, host) in self.hosts.iter().enumerate() {
            for (c, check) in host.checks.iter().enumerate() {
                if Some(CheckKey::new(h, c)) == key {
                    continue;
                }
                if let (Some(id), Some(parent)) = (&check.config.id, &check.config.depends_on) {
                    edges.insert(id, parent);
                }
            }
        }
        if let (Some(id), Some(parent)) = (&candidate.id, &candidate.depends_on) {
            edges.insert(id, parent);
        }

        match find_cycle(&edges) {
            Some(cycle) => Err(Error::conflict(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            ))),
            None => Ok(()),
        }
    }

    fn push_check(&mut self, host: &str, check: CheckConfig) -> Result<usize> {
        let h = self.host_index(host)?;
        self.validate_candidate(None, &check)?;
        info!(host, check = %check.label(), "Adding check");
        self.hosts[h].checks.push(CheckStatus::new(check));
        Ok(self.hosts[h].checks.len() - 1)
    }

    /// Replace the config of the check at `key`, keeping its runtime status.
    fn replace_check(&mut self, key: CheckKey, check: CheckConfig) -> Result<()> {
        self.validate_candidate(Some(key), &check)?;
        self.check_mut(key).config = check;
        Ok(())
    }

    fn typed_check(&self, host: &str, index: usize, expected: CheckType) -> Result<CheckKey> {
        let key = self.check_key(host, index)?;
        let actual = self.hosts[key.host].checks[key.check].config.check_type;
        if actual != expected {
            return Err(Error::conflict(format!(
                "check {} on host {:?} is {}, not {}",
                index, host, actual, expected
            )));
        }
        Ok(key)
    }

    fn insert_host(&mut self, host: HostConfig) -> Result<()> {
        check_host_name(&host.name)?;
        if self.hosts.iter().any(|h| h.name == host.name) {
            return Err(Error::conflict(format!("host {:?} already exists", host.name)));
        }
        info!(host = %host.name, address = %host.address, "Adding host");
        self.hosts.push(HostStatus::from_config(host));
        Ok(())
    }
}

/// Blank names would fail validation on the next load.
fn check_host_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_argument("host name must not be empty"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Shared status of every host and check.
///
/// Reads take the shared lock and return owned copies. Mutations persist the
/// derived config before returning; a persistence failure is returned after
/// the in-memory change has been applied.
#[derive(Debug)]
pub struct StatusStore {
    inner: RwLock<StoreState>,
    settings_tx: watch::Sender<Settings>,
}

impl StatusStore {
    /// Build an unbound store from an in-memory config.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_persister(config, ConfigPersister::unbound())
    }

    pub fn with_persister(mut config: Config, persister: ConfigPersister) -> Result<Self> {
        config.normalize();
        config.validate()?;
        let (settings_tx, _) = watch::channel(config.settings.clone());
        Ok(Self {
            inner: RwLock::new(StoreState::new(config, persister)),
            settings_tx,
        })
    }

    /// Load a config file and bind the store to it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::load(path)?;
        Self::with_persister(config, ConfigPersister::bound(path))
    }

    pub(crate) async fn lock(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.write().await
    }

    async fn mutate<T>(&self, op: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.inner.write().await;
        let value = op(&mut state)?;
        state.rebuild_index();
        state.persist()?;
        Ok(value)
    }

    /// Settings are published to subscribers before they are persisted.
    async fn update_settings(&self, apply: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut state = self.inner.write().await;
        apply(&mut state.settings);
        self.settings_tx.send_replace(state.settings.clone());
        state.persist()
    }

    /// Watch notification settings. The receiver sees every later update
    /// and closes when the store is dropped.
    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    /// Bind (or rebind) the file mutations are persisted to.
    pub async fn bind_config_path(&self, path: impl AsRef<Path>) {
        let persister = ConfigPersister::bound(path);
        if let Some(path) = persister.path() {
            info!(path = %path.display(), "Bound monitor config path");
        }
        self.inner.write().await.persister = persister;
    }

    // -- Reads --

    /// Deep copy of all hosts in declaration order.
    pub async fn snapshot(&self) -> Vec<HostStatus> {
        self.inner.read().await.hosts.clone()
    }

    pub async fn get_host(&self, name: &str) -> Option<HostStatus> {
        let state = self.inner.read().await;
        state.hosts.iter().find(|h| h.name == name).cloned()
    }

    pub async fn check_by_id(&self, id: &str) -> Option<CheckStatus> {
        let state = self.inner.read().await;
        let key = state.ids.get(id)?;
        Some(state.hosts[key.host].checks[key.check].clone())
    }

    /// Declarative view of the current state, as it would be persisted.
    pub async fn config(&self) -> Config {
        self.inner.read().await.config()
    }

    pub async fn settings(&self) -> Settings {
        self.inner.read().await.settings.clone()
    }

    pub async fn mqtt_settings(&self) -> MqttSettings {
        self.inner.read().await.settings.mqtt.clone()
    }

    pub async fn pushover_settings(&self) -> PushoverSettings {
        self.inner.read().await.settings.pushover.clone()
    }

    pub async fn telegram_settings(&self) -> TelegramSettings {
        self.inner.read().await.settings.telegram.clone()
    }

    pub async fn aggregate_stats(&self) -> AggregateStats {
        AggregateStats::from_hosts(&self.inner.read().await.hosts)
    }

    pub async fn host_analytics(&self, name: &str) -> Option<HostAnalytics> {
        let state = self.inner.read().await;
        state
            .hosts
            .iter()
            .find(|h| h.name == name)
            .map(HostAnalytics::from_host)
    }

    pub async fn all_host_analytics(&self) -> Vec<HostAnalytics> {
        let state = self.inner.read().await;
        state.hosts.iter().map(HostAnalytics::from_host).collect()
    }

    // -- Hosts --

    /// Add a host with a single enabled ping check.
    pub async fn add_host(&self, name: &str, address: &str, health_ping_url: Option<String>) -> Result<()> {
        self.mutate(|state| {
            state.insert_host(HostConfig {
                name: name.to_string(),
                address: address.to_string(),
                healthchecks_ping_url: non_empty(health_ping_url),
                checks: vec![CheckConfig::ping()],
            })
        })
        .await
    }

    pub async fn add_host_without_default_check(
        &self,
        name: &str,
        address: &str,
        health_ping_url: Option<String>,
    ) -> Result<()> {
        self.mutate(|state| {
            state.insert_host(HostConfig {
                name: name.to_string(),
                address: address.to_string(),
                healthchecks_ping_url: non_empty(health_ping_url),
                checks: Vec::new(),
            })
        })
        .await
    }

    /// Rename and re-address a host, keeping its checks and their history.
    pub async fn update_host(
        &self,
        name: &str,
        new_name: &str,
        address: &str,
        health_ping_url: Option<String>,
    ) -> Result<()> {
        self.mutate(|state| {
            let h = state.host_index(name)?;
            check_host_name(new_name)?;
            if new_name != name && state.hosts.iter().any(|host| host.name == new_name) {
                return Err(Error::conflict(format!("host {:?} already exists", new_name)));
            }
            let host = &mut state.hosts[h];
            host.name = new_name.to_string();
            host.address = address.to_string();
            host.health_ping_url = non_empty(health_ping_url);
            info!(host = name, new_name, address, "Updated host");
            Ok(())
        })
        .await
    }

    pub async fn delete_host(&self, name: &str) -> Result<()> {
        self.mutate(|state| {
            let h = state.host_index(name)?;
            state.hosts.remove(h);
            info!(host = name, "Deleted host");
            Ok(())
        })
        .await
    }

    pub async fn set_health_ping_url(&self, name: &str, url: Option<String>) -> Result<()> {
        self.mutate(|state| {
            let h = state.host_index(name)?;
            state.hosts[h].health_ping_url = non_empty(url);
            Ok(())
        })
        .await
    }

    // -- Checks --

    /// Returns the index of the new check.
    pub async fn add_ping_check(&self, host: &str, options: CheckOptions) -> Result<usize> {
        self.mutate(|state| state.push_check(host, CheckConfig::ping().with_options(options)))
            .await
    }

    /// An empty URL probes `http://<address>`; `expect` 0 is stored as 200.
    pub async fn add_http_check(
        &self,
        host: &str,
        url: Option<String>,
        expect: u16,
        options: CheckOptions,
    ) -> Result<usize> {
        self.mutate(|state| state.push_check(host, CheckConfig::http(url, expect).with_options(options)))
            .await
    }

    /// Port 0 is stored as 80.
    pub async fn add_tcp_check(&self, host: &str, port: u16, options: CheckOptions) -> Result<usize> {
        self.mutate(|state| state.push_check(host, CheckConfig::tcp(port).with_options(options)))
            .await
    }

    pub async fn update_http_check(
        &self,
        host: &str,
        index: usize,
        url: Option<String>,
        expect: u16,
        options: CheckOptions,
    ) -> Result<()> {
        self.mutate(|state| {
            let key = state.typed_check(host, index, CheckType::Http)?;
            let mut check = state.hosts[key.host].checks[key.check].config.clone();
            let typed = CheckConfig::http(url, expect);
            check.url = typed.url;
            check.expect = typed.expect;
            check.set_options(options);
            state.replace_check(key, check)
        })
        .await
    }

    pub async fn update_tcp_check(
        &self,
        host: &str,
        index: usize,
        port: u16,
        options: CheckOptions,
    ) -> Result<()> {
        self.mutate(|state| {
            let key = state.typed_check(host, index, CheckType::Tcp)?;
            let mut check = state.hosts[key.host].checks[key.check].config.clone();
            check.port = CheckConfig::tcp(port).port;
            check.set_options(options);
            state.replace_check(key, check)
        })
        .await
    }

    /// Change ID, dependency and notification flags of a check of any type.
    pub async fn update_check_dependencies(
        &self,
        host: &str,
        index: usize,
        options: CheckOptions,
    ) -> Result<()> {
        self.mutate(|state| {
            let key = state.check_key(host, index)?;
            let check = state.hosts[key.host].checks[key.check]
                .config
                .clone()
                .with_options(options);
            state.replace_check(key, check)
        })
        .await
    }

    /// Remove a check; later checks on the host shift down by one.
    pub async fn remove_check(&self, host: &str, index: usize) -> Result<()> {
        self.mutate(|state| {
            let key = state.check_key(host, index)?;
            let removed = state.hosts[key.host].checks.remove(key.check);
            info!(host, check = %removed.config.label(), "Removed check");
            Ok(())
        })
        .await
    }

    pub async fn toggle(&self, host: &str, index: usize, enabled: bool) -> Result<()> {
        self.mutate(|state| {
            let key = state.check_key(host, index)?;
            state.check_mut(key).config.enabled = enabled;
            Ok(())
        })
        .await
    }

    pub async fn set_all_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate(|state| {
            for check in state.hosts.iter_mut().flat_map(|h| h.checks.iter_mut()) {
                check.config.enabled = enabled;
            }
            info!(enabled, "Toggled all checks");
            Ok(())
        })
        .await
    }

    // -- Settings --

    pub async fn update_mqtt_settings(&self, settings: MqttSettings) -> Result<()> {
        self.update_settings(|current| current.mqtt = settings).await
    }

    pub async fn update_pushover_settings(&self, settings: PushoverSettings) -> Result<()> {
        self.update_settings(|current| current.pushover = settings).await
    }

    pub async fn update_telegram_settings(&self, settings: TelegramSettings) -> Result<()> {
        self.update_settings(|current| current.telegram = settings).await
    }
}
