//! Runtime assembly: status store, coordinator, service, broker router and
//! the ticket retention loop.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tributary_broker::{Publisher, Router, RouterHandle, RouterMetricsSnapshot, Subscriber};
use tributary_catalog::{CatalogReconciler, ComputeEngine, Metastore};
use tributary_extractor::ExtractionPlatform;
use tributary_status_store::{RetentionPolicy, StatusStore};

use crate::config::ManagerConfig;
use crate::coordinator::Coordinator;
use crate::instrument::{ExtractorMetrics, InstrumentedExtractor};
use crate::service::IngestionService;
use crate::worker::register_handlers;

const MAX_PURGE_PERIOD: Duration = Duration::from_secs(3600);

/// The external systems the manager drives.
pub struct Capabilities {
    pub platform: Arc<dyn ExtractionPlatform>,
    pub metastore: Arc<dyn Metastore>,
    pub compute: Arc<dyn ComputeEngine>,
}

pub struct ManagerRuntime {
    service: Arc<IngestionService>,
    router: RouterHandle,
    extractor_metrics: Arc<ExtractorMetrics>,
    retention_shutdown: watch::Sender<bool>,
    retention_task: JoinHandle<()>,
}

/// Install the manager's tracing subscriber.
pub fn init_logging(config: &ManagerConfig) -> Result<()> {
    tributary_logging::init_logging(config.log_config())
}

impl ManagerRuntime {
    /// Open the configured status store and start the manager on `broker`.
    pub async fn start<B>(
        config: &ManagerConfig,
        capabilities: Capabilities,
        broker: Arc<B>,
    ) -> Result<Self>
    where
        B: Publisher + Subscriber + 'static,
    {
        let store = config
            .status_store
            .open()
            .await
            .with_context(|| format!("Failed to open status store {}", config.status_store))?;
        Self::start_with_store(config, capabilities, broker, store).await
    }

    pub async fn start_with_store<B>(
        config: &ManagerConfig,
        capabilities: Capabilities,
        broker: Arc<B>,
        store: Arc<dyn StatusStore>,
    ) -> Result<Self>
    where
        B: Publisher + Subscriber + 'static,
    {
        let coordinator = Coordinator::new(store.clone(), broker.clone());
        let platform = InstrumentedExtractor::new(capabilities.platform);
        let extractor_metrics = platform.metrics();
        let catalog = CatalogReconciler::with_options(
            capabilities.metastore,
            capabilities.compute,
            config.reconciler.clone(),
        );
        let service = Arc::new(IngestionService::new(
            Arc::new(platform),
            Arc::new(catalog),
            coordinator,
        ));

        let mut router = Router::new(config.router.clone(), broker.clone(), broker);
        register_handlers(&mut router, service.clone(), &config.router.dead_letter_topic);
        let routes = router.route_count();
        let router = router.start().await.context("Failed to start broker router")?;

        let (retention_shutdown, shutdown_rx) = watch::channel(false);
        let retention_task = tokio::spawn(retention_loop(store, config.retention, shutdown_rx));

        info!(
            routes,
            max_retries = config.router.retry.max_retries,
            dead_letter_topic = %config.router.dead_letter_topic,
            "Manager started"
        );
        Ok(Self {
            service,
            router,
            extractor_metrics,
            retention_shutdown,
            retention_task,
        })
    }

    pub fn service(&self) -> Arc<IngestionService> {
        self.service.clone()
    }

    pub fn router_metrics(&self) -> RouterMetricsSnapshot {
        self.router.metrics()
    }

    pub fn extractor_metrics(&self) -> Arc<ExtractorMetrics> {
        self.extractor_metrics.clone()
    }

    /// Stop consuming, let in-flight work settle, stop the retention loop.
    pub async fn shutdown(self) {
        self.router.shutdown().await;
        let _ = self.retention_shutdown.send(true);
        if let Err(e) = self.retention_task.await {
            warn!("Retention task panicked: {:?}", e);
        }
        info!("Manager stopped");
    }
}

fn purge_period(policy: &RetentionPolicy) -> Duration {
    policy
        .ttl
        .to_std()
        .map_or(MAX_PURGE_PERIOD, |ttl| ttl.min(MAX_PURGE_PERIOD))
        .max(Duration::from_secs(1))
}

async fn retention_loop(
    store: Arc<dyn StatusStore>,
    policy: RetentionPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(purge_period(&policy));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match policy.apply(store.as_ref()).await {
                    Ok(0) => debug!("No expired tickets"),
                    Ok(purged) => info!(purged, "Purged expired tickets"),
                    Err(e) => warn!("Ticket purge failed: {}", e),
                }
            }
        }
    }
}
