use crate::harvest::{rebuild_metadata, HarvestPipeline};
use crate::model::{HarvestAdminParameters, HarvestDataSource, HarvestReport, PUBLIC_SERVICE_DATA_TYPE};
use crate::store::HarvestStore;
use crate::traits::{AdapterError, ReportPublisher, SourceRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Unable to list harvest sources: {0}")]
    Registry(#[from] AdapterError),
    #[error("Semaphore error: {0}")]
    Semaphore(#[from] AcquireError),
}

/// Runs harvest cycles over every source the registry lists.
///
/// `cycle_lock` admits one cycle at a time; overlapping triggers wait for it
/// in arrival order. `workers` bounds how many sources are fetched and
/// reconciled at once.
pub struct HarvesterExecutor {
    registry: Arc<dyn SourceRegistry>,
    pipeline: Arc<HarvestPipeline>,
    store: Arc<dyn HarvestStore>,
    publisher: Arc<dyn ReportPublisher>,
    harvester_uri: String,
    cycle_lock: Arc<Semaphore>,
    workers: Arc<Semaphore>,
}

impl HarvesterExecutor {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        pipeline: HarvestPipeline,
        store: Arc<dyn HarvestStore>,
        publisher: Arc<dyn ReportPublisher>,
        harvester_uri: impl Into<String>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            registry,
            pipeline: Arc::new(pipeline),
            store,
            publisher,
            harvester_uri: harvester_uri.into(),
            cycle_lock: Arc::new(Semaphore::new(1)),
            workers: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    /// Shares a cycle lock with other executors over the same store.
    pub fn with_cycle_lock(mut self, cycle_lock: Arc<Semaphore>) -> Self {
        self.cycle_lock = cycle_lock;
        self
    }

    /// Shares a worker pool, e.g. with other harvesters using the same
    /// outbound connections.
    pub fn with_workers(mut self, workers: Arc<Semaphore>) -> Self {
        self.workers = workers;
        self
    }

    /// Starts a cycle in the background. It runs once every earlier cycle has
    /// finished.
    pub fn trigger(
        self: &Arc<Self>,
        params: HarvestAdminParameters,
        force_update: bool,
    ) -> JoinHandle<Result<Vec<HarvestReport>, ExecutorError>> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.run_cycle(&params, force_update).await })
    }

    /// Harvests every public service source matching `params`, rebuilds the
    /// metadata graphs and publishes the reports.
    ///
    /// Individual sources never fail the cycle; only an unreachable registry
    /// does.
    #[instrument(skip(self, params), fields(all = params.harvest_all_services()))]
    pub async fn run_cycle(
        &self,
        params: &HarvestAdminParameters,
        force_update: bool,
    ) -> Result<Vec<HarvestReport>, ExecutorError> {
        let _cycle = self.cycle_lock.acquire().await?;
        let start = Instant::now();

        let sources: Vec<HarvestDataSource> = self
            .registry
            .list_sources(params)
            .await?
            .into_iter()
            .filter(|source| {
                source.data_type.as_deref() == Some(PUBLIC_SERVICE_DATA_TYPE) && source.url.is_some()
            })
            .collect();

        info!(sources = sources.len(), force_update, "Starting harvest cycle");

        let handles: Vec<(HarvestDataSource, JoinHandle<HarvestReport>)> = sources
            .into_iter()
            .map(|source| {
                let pipeline = Arc::clone(&self.pipeline);
                let workers = Arc::clone(&self.workers);
                let task_source = source.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match workers.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return failed_report(&task_source, format!("Semaphore error: {}", e)),
                    };
                    pipeline.execute(&task_source, force_update).await.report
                });
                (source, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(url = source.url.as_deref(), error = %e, "Harvest task failed");
                    failed_report(&source, format!("Harvest task failed: {}", e))
                }
            };
            reports.push(report);
        }

        if force_update || reports.iter().any(|r| r.has_changes()) {
            if let Err(e) = rebuild_metadata(self.store.as_ref(), &self.harvester_uri).await {
                error!(error = %e, "Metadata rebuild failed");
            }
        } else {
            info!("No changes in harvest cycle, skipping metadata rebuild");
        }

        self.publisher.publish(&reports).await;

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            reports = reports.len(),
            errors = reports.iter().filter(|r| r.harvest_error).count(),
            "Finished harvest cycle"
        );
        Ok(reports)
    }
}

fn failed_report(source: &HarvestDataSource, message: String) -> HarvestReport {
    HarvestReport::error(
        source.id.as_deref().unwrap_or_default(),
        source.url.as_deref().unwrap_or_default(),
        Utc::now(),
        message,
    )
}
