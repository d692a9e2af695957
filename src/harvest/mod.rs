//! Harvest module - splitting, reconciliation and per-source pipeline.
//!
//! This module provides the core of the public service harvester:
//! - **Splitter**: harvested graph → [`ServiceRecord`]s and [`CatalogRecord`]s
//! - **Reconcile**: change detection, identifier lifecycle and removal via [`Reconciler`]
//! - **Metadata**: catalog records and union graphs via [`rebuild_metadata`]
//! - **Pipeline**: async per-source executor via [`pipeline::HarvestPipeline`]
//! - **Errors**: the per-source failure taxonomy [`HarvestError`]

pub mod metadata;
pub mod pipeline;
pub mod reconcile;
pub mod splitter;
pub mod traits;

// Re-export commonly used types
pub use traits::{CatalogRecord, HarvestError, ServiceRecord};

pub use metadata::{catalog_fdk_uri, rebuild_metadata, service_fdk_uri};
pub use pipeline::{HarvestPipeline, HarvestResult, HarvestStats};
pub use reconcile::{HarvestChanges, Reconciler};
pub use splitter::{generated_catalog_uri, split_catalogs, split_services};
