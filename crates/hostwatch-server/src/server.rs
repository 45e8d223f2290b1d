//! Main hostwatch daemon: wires the store, evaluator, scheduler, notification
//! dispatcher and metrics endpoint together.

use crate::channels::{HttpHealthPinger, PushoverSink, TelegramSink};
use crate::http_server::MetricsServer;
use crate::mqtt::MqttSink;
use crate::types::ServerConfig;
use hostwatch::config::{MqttSettings, PushoverSettings, TelegramSettings};
use hostwatch::{
    AlertSink, Dispatcher, Evaluator, EventLog, HealthPinger, MetricsRegistry, Scheduler,
    StatusStore,
};
use probe::SystemProber;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Hostwatch server
pub struct HostwatchServer {
    config: ServerConfig,
}

impl HostwatchServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` resolves, then stop the scheduler and drain the
    /// notification queue.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!(config = %self.config.config_path.display(), "Starting hostwatch server");

        let store = Arc::new(StatusStore::from_file(&self.config.config_path)?);
        let settings_rx = store.subscribe_settings();
        let settings = settings_rx.borrow().clone();

        let metrics = if self.config.metrics_enabled {
            info!("Metrics enabled on {}", self.config.metrics_listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        // Notification channels
        let http = reqwest::Client::builder()
            .timeout(self.config.send_timeout)
            .build()?;
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(MqttSink::new(MqttSettings::default())),
            Arc::new(PushoverSink::new(http.clone(), PushoverSettings::default())),
            Arc::new(TelegramSink::new(http.clone(), TelegramSettings::default())),
        ];
        let pinger: Arc<dyn HealthPinger> = Arc::new(HttpHealthPinger::new(http));
        let (dispatcher, notify_handle) = Dispatcher::spawn(
            sinks,
            Some(pinger),
            self.config.queue_size,
            self.config.send_timeout,
            metrics.clone(),
        );
        dispatcher.apply_settings(&settings).await;
        let settings_handle = dispatcher.follow_settings(settings_rx);

        let prober = Arc::new(SystemProber::new()?);
        let mut evaluator = Evaluator::new(store, prober, Arc::new(EventLog::new()))
            .with_dispatcher(dispatcher);
        if let Some(ref registry) = metrics {
            evaluator = evaluator.with_metrics(registry.clone());
        }

        let cancel = CancellationToken::new();

        // Spawn HTTP metrics server (if enabled)
        let metrics_handle = metrics.map(|registry| {
            let server = MetricsServer::new(registry, self.config.metrics_listen_addr.clone());
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(cancel).await {
                    warn!(error = %e, "Metrics server error");
                }
            })
        });

        let scheduler_handle =
            Scheduler::new(Arc::new(evaluator), self.config.interval).spawn(cancel.clone());

        info!("All tasks spawned, server running");
        shutdown.await;
        cancel.cancel();

        // The scheduler owns the last dispatcher handle and the store, so the
        // notification worker drains and the settings watch closes once the
        // scheduler is gone.
        scheduler_handle.await?;
        notify_handle.await?;
        settings_handle.await?;
        if let Some(handle) = metrics_handle {
            handle.await?;
        }

        info!("Hostwatch server stopped");
        Ok(())
    }
}
