//! Per-source harvest pipeline.
//!
//! This module provides the [`HarvestPipeline`] coordinator that runs one data
//! source through sequential stages (Negotiate → Fetch → Parse → Reconcile)
//! with:
//! - Async execution via `tokio`
//! - A configurable timeout on the fetch stage
//! - Parsing on the blocking thread pool
//! - Structured logging via `tracing`
//!
//! The pipeline never returns an error. Every [`HarvestError`] is turned into
//! a failed [`HarvestReport`] for the source, so one source cannot abort its
//! siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use super::reconcile::{HarvestChanges, Reconciler};
use super::traits::HarvestError;
use crate::model::{HarvestDataSource, HarvestReport, Organization};
use crate::rdf::{format_from_accept_header, parse_graph};
use crate::traits::{OrganizationResolver, RdfFetcher};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Outcome of harvesting one source.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    /// Report announced downstream
    pub report: HarvestReport,

    /// Timing and size statistics
    pub stats: HarvestStats,
}

/// Statistics about a single source harvest.
#[derive(Debug, Default, Clone)]
pub struct HarvestStats {
    /// Total time spent on the source (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent waiting for the source document (milliseconds)
    pub fetch_duration_ms: u64,

    /// Time spent parsing the document (milliseconds)
    pub parse_duration_ms: u64,

    /// Time spent comparing with and writing to the store (milliseconds)
    pub reconcile_duration_ms: u64,

    /// Size of the fetched document (bytes)
    pub body_size_bytes: u64,

    /// Number of triples in the parsed graph
    pub triples: usize,
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Harvest pipeline for a single data source.
///
/// # Thread Safety
///
/// The pipeline is `Send + Sync` and is shared by every source task of a
/// harvest cycle behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use public_service_harvester::harvest::{HarvestPipeline, Reconciler};
/// use std::time::Duration;
///
/// let pipeline = HarvestPipeline::new(fetcher, Reconciler::new(store, harvester_uri))
///     .with_organizations(organizations)
///     .with_timeout(Duration::from_secs(600));
///
/// let result = pipeline.execute(&source, false).await;
/// println!("{} changed", result.report.changed_resources.len());
/// ```
pub struct HarvestPipeline {
    /// Downloads source documents
    fetcher: Arc<dyn RdfFetcher>,

    /// Looks up the publisher of a source for its generated catalog
    organizations: Option<Arc<dyn OrganizationResolver>>,

    /// Applies the parsed graph to persisted state
    reconciler: Reconciler,

    /// Timeout for the fetch stage (default: 10 minutes)
    fetch_timeout: Duration,
}

impl HarvestPipeline {
    /// Creates a pipeline without an organization lookup.
    ///
    /// Default configuration:
    /// - Fetch timeout: 10 minutes
    pub fn new(fetcher: Arc<dyn RdfFetcher>, reconciler: Reconciler) -> Self {
        Self {
            fetcher,
            organizations: None,
            reconciler,
            fetch_timeout: Duration::from_secs(600),
        }
    }

    /// Sets the maximum time allowed for downloading a source document.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolves publishers so generated catalogs get a publisher and labels.
    pub fn with_organizations(mut self, organizations: Arc<dyn OrganizationResolver>) -> Self {
        self.organizations = Some(organizations);
        self
    }

    /// Harvests `source` and reports the outcome.
    ///
    /// With `force_update`, unchanged sources and entities are written again
    /// but not reported as changed.
    #[instrument(
        skip(self, source),
        fields(source_id = source.id.as_deref(), url = source.url.as_deref())
    )]
    pub async fn execute(&self, source: &HarvestDataSource, force_update: bool) -> HarvestResult {
        let start = Instant::now();
        let started_at = Utc::now();
        let mut stats = HarvestStats::default();

        let id = source.id.as_deref().unwrap_or_default();
        let url = source.url.as_deref().unwrap_or_default();

        let report = match self.run(source, force_update, &mut stats).await {
            Ok(changes) => {
                info!(
                    changed_catalogs = changes.changed_catalogs.len(),
                    changed_resources = changes.changed_resources.len(),
                    removed_resources = changes.removed_resources.len(),
                    "Harvest completed"
                );
                HarvestReport {
                    changed_catalogs: changes.changed_catalogs,
                    changed_resources: changes.changed_resources,
                    removed_resources: changes.removed_resources,
                    ..HarvestReport::success(id, url, started_at)
                }
            }
            Err(e) => {
                error!(error = %e, "Harvest failed");
                HarvestReport::error(id, url, started_at, e.to_string())
            }
        };

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        HarvestResult { report, stats }
    }

    async fn run(
        &self,
        source: &HarvestDataSource,
        force_update: bool,
        stats: &mut HarvestStats,
    ) -> Result<HarvestChanges, HarvestError> {
        let (Some(_), Some(url)) = (source.id.as_deref(), source.url.as_deref()) else {
            return Err(HarvestError::SourceUndefined);
        };

        // ====================================================================
        // Stage 1: Negotiation
        // ====================================================================

        let accept = source.accept_header_value.as_deref();
        let format = format_from_accept_header(accept)
            .map_err(|e| HarvestError::negotiation(url, accept, e))?;
        let accept = accept.unwrap_or_else(|| format.media_type());

        // ====================================================================
        // Stage 2: Fetch
        // ====================================================================

        let fetch_start = Instant::now();
        let body = timeout(self.fetch_timeout, self.fetcher.fetch(url, accept))
            .await
            .map_err(|_| HarvestError::Timeout {
                url: url.to_string(),
                timeout_secs: self.fetch_timeout.as_secs(),
            })?
            .map_err(|source| HarvestError::Fetch {
                url: url.to_string(),
                source,
            })?;

        stats.fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        stats.body_size_bytes = body.len() as u64;
        info!(
            duration_ms = stats.fetch_duration_ms,
            size_bytes = stats.body_size_bytes,
            "Fetch completed"
        );

        // ====================================================================
        // Stage 3: Parse
        // ====================================================================

        let parse_start = Instant::now();
        let graph = tokio::task::spawn_blocking(move || parse_graph(&body, format))
            .await
            .map_err(|e| HarvestError::Task(format!("Task join error: {}", e)))?
            .map_err(|source| HarvestError::Parse {
                url: url.to_string(),
                source,
            })?;

        stats.parse_duration_ms = parse_start.elapsed().as_millis() as u64;
        stats.triples = graph.len();
        info!(
            duration_ms = stats.parse_duration_ms,
            triples = stats.triples,
            "Parse completed"
        );

        // ====================================================================
        // Stage 4: Reconcile
        // ====================================================================

        let organization = self.resolve_organization(source.publisher_id.as_deref()).await;

        let reconcile_start = Instant::now();
        let changes = self
            .reconciler
            .reconcile(url, graph, organization.as_ref(), force_update)
            .await?;

        stats.reconcile_duration_ms = reconcile_start.elapsed().as_millis() as u64;
        info!(duration_ms = stats.reconcile_duration_ms, "Reconcile completed");

        Ok(changes)
    }

    /// A failed lookup only costs the generated catalog its labels.
    async fn resolve_organization(&self, publisher_id: Option<&str>) -> Option<Organization> {
        let (Some(organizations), Some(publisher_id)) = (&self.organizations, publisher_id) else {
            return None;
        };

        match organizations.organization(publisher_id).await {
            Ok(organization) => organization,
            Err(e) => {
                warn!(publisher_id, error = %e, "Unable to resolve publisher");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
