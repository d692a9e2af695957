//! Reconciliation of a harvested source graph against persisted state.
//!
//! A source harvest passes three gates in order:
//!
//! 1. **Source gate**: an unchanged source document (modulo blank node
//!    labels) short-circuits the whole harvest with no writes.
//! 2. **Entity gate**: each split service and catalog is compared with its
//!    last persisted content; only new, re-appearing or changed entities get
//!    a bumped `modified` and are reported.
//! 3. **Removal detection**: services still linked to one of this source's
//!    catalogs but absent from the new harvest are soft-deleted.
//!
//! Writes are per entity key. A failure part way leaves earlier entities
//! updated; the next harvest converges because every step is idempotent and
//! the source document is only stored once every entity write succeeded.

use super::metadata::{catalog_fdk_uri, catalog_record_graph, service_record_graph};
use super::splitter::{split_catalogs, split_services};
use super::traits::{CatalogRecord, HarvestError, ServiceRecord};
use crate::model::{CatalogMeta, FdkIdAndUri, Organization, ServiceMeta};
use crate::rdf::{create_id_from_string, is_isomorphic, union};
use crate::store::{load_graph, save_graph, GraphCollection, HarvestStore};
use chrono::{DateTime, Utc};
use oxrdf::Graph;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Entities touched by one source harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestChanges {
    pub changed_catalogs: Vec<FdkIdAndUri>,
    pub changed_resources: Vec<FdkIdAndUri>,
    pub removed_resources: Vec<FdkIdAndUri>,
}

impl HarvestChanges {
    pub fn is_empty(&self) -> bool {
        self.changed_catalogs.is_empty()
            && self.changed_resources.is_empty()
            && self.removed_resources.is_empty()
    }
}

pub struct Reconciler {
    store: Arc<dyn HarvestStore>,
    harvester_uri: String,
    empty_source_is_error: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn HarvestStore>, harvester_uri: impl Into<String>) -> Self {
        Self {
            store,
            harvester_uri: harvester_uri.into(),
            empty_source_is_error: false,
        }
    }

    /// Treat a source that yields no services as a failed harvest instead of
    /// a valid "everything removed" state.
    pub fn with_empty_source_is_error(mut self, empty_source_is_error: bool) -> Self {
        self.empty_source_is_error = empty_source_is_error;
        self
    }

    pub async fn reconcile(
        &self,
        source_url: &str,
        harvested: Graph,
        organization: Option<&Organization>,
        force_update: bool,
    ) -> Result<HarvestChanges, HarvestError> {
        self.reconcile_at(source_url, harvested, organization, force_update, Utc::now())
            .await
    }

    /// Reconciles `harvested` using `harvest_date` as the modification time
    /// of every entity that changes.
    #[instrument(skip(self, harvested, organization), fields(triples = harvested.len()))]
    pub async fn reconcile_at(
        &self,
        source_url: &str,
        harvested: Graph,
        organization: Option<&Organization>,
        force_update: bool,
        harvest_date: DateTime<Utc>,
    ) -> Result<HarvestChanges, HarvestError> {
        let store = self.store.as_ref();

        let previous = load_graph(store, GraphCollection::HarvestSource, source_url).await?;
        if !force_update && previous.is_some_and(|previous| is_isomorphic(&previous, &harvested)) {
            info!(source_url, "No changes from last harvest");
            return Ok(HarvestChanges::default());
        }

        let services = split_services(&harvested, source_url);
        if services.is_empty() && self.empty_source_is_error {
            return Err(HarvestError::NoServicesFound {
                url: source_url.to_string(),
            });
        }

        info!(source_url, "Changes detected, updating metadata");

        let catalogs = split_catalogs(&harvested, &services, source_url, organization);
        debug!(
            services = services.len(),
            catalogs = catalogs.len(),
            "Split harvested graph"
        );

        let mut changes = HarvestChanges::default();
        for service in &services {
            if let Some(changed) = self.reconcile_service(service, force_update, harvest_date).await? {
                changes.changed_resources.push(changed);
            }
        }

        let mut catalog_public_uris = BTreeSet::new();
        for catalog in &catalogs {
            let (meta, changed) = self
                .reconcile_catalog(catalog, source_url, force_update, harvest_date)
                .await?;
            let public_uri = catalog_fdk_uri(&self.harvester_uri, &meta.fdk_id);
            self.link_services_to_catalog(&catalog.services, &public_uri).await?;
            catalog_public_uris.insert(public_uri);

            if changed {
                changes.changed_catalogs.push(FdkIdAndUri {
                    fdk_id: meta.fdk_id,
                    uri: meta.uri,
                });
            }
        }

        for previous in store.catalog_metas_by_source(source_url).await? {
            catalog_public_uris.insert(catalog_fdk_uri(&self.harvester_uri, &previous.fdk_id));
        }

        let harvested_uris: BTreeSet<&str> = services
            .iter()
            .map(|service| service.resource_uri.as_str())
            .collect();
        changes.removed_resources = self
            .mark_removed_services(&catalog_public_uris, &harvested_uris, harvest_date)
            .await?;

        // Only a fully applied harvest may become the baseline for the source gate
        save_graph(store, GraphCollection::HarvestSource, source_url, &harvested).await?;

        Ok(changes)
    }

    async fn reconcile_service(
        &self,
        service: &ServiceRecord,
        force_update: bool,
        harvest_date: DateTime<Utc>,
    ) -> Result<Option<FdkIdAndUri>, HarvestError> {
        let stored = self.store.service_meta(&service.resource_uri).await?;

        if let Some(meta) = &stored {
            if !meta.removed
                && !self
                    .differs_from_stored(GraphCollection::Service, &meta.fdk_id, &service.harvested)
                    .await?
            {
                if force_update {
                    self.save_service_graphs(service, meta).await?;
                }
                return Ok(None);
            }
        }

        let meta = ServiceMeta {
            uri: service.resource_uri.clone(),
            fdk_id: stored
                .as_ref()
                .map(|meta| meta.fdk_id.clone())
                .unwrap_or_else(|| create_id_from_string(&service.resource_uri)),
            is_part_of: stored.as_ref().and_then(|meta| meta.is_part_of.clone()),
            removed: false,
            issued: stored.as_ref().map(|meta| meta.issued).unwrap_or(harvest_date),
            modified: harvest_date,
        };

        self.store.save_service_meta(meta.clone()).await?;
        self.save_service_graphs(service, &meta).await?;

        Ok(Some(FdkIdAndUri {
            fdk_id: meta.fdk_id,
            uri: meta.uri,
        }))
    }

    async fn reconcile_catalog(
        &self,
        catalog: &CatalogRecord,
        source_url: &str,
        force_update: bool,
        harvest_date: DateTime<Utc>,
    ) -> Result<(CatalogMeta, bool), HarvestError> {
        let stored = self.store.catalog_meta(&catalog.resource_uri).await?;

        if let Some(meta) = stored.clone() {
            if !meta.removed
                && !self
                    .differs_from_stored(GraphCollection::Catalog, &meta.fdk_id, &catalog.harvested)
                    .await?
            {
                if force_update {
                    self.save_catalog_graphs(catalog, &meta).await?;
                }
                return Ok((meta, false));
            }
        }

        let meta = CatalogMeta {
            uri: catalog.resource_uri.clone(),
            fdk_id: stored
                .as_ref()
                .map(|meta| meta.fdk_id.clone())
                .unwrap_or_else(|| create_id_from_string(&catalog.resource_uri)),
            services: catalog.services.clone(),
            removed: false,
            issued: stored.as_ref().map(|meta| meta.issued).unwrap_or(harvest_date),
            modified: harvest_date,
            harvest_source: Some(source_url.to_string()),
        };

        self.store.save_catalog_meta(meta.clone()).await?;
        self.save_catalog_graphs(catalog, &meta).await?;

        Ok((meta, true))
    }

    async fn differs_from_stored(
        &self,
        collection: GraphCollection,
        fdk_id: &str,
        harvested: &Graph,
    ) -> Result<bool, HarvestError> {
        let stored = load_graph(self.store.as_ref(), collection, fdk_id).await?;
        Ok(stored.map_or(true, |stored| !is_isomorphic(&stored, harvested)))
    }

    async fn save_service_graphs(&self, service: &ServiceRecord, meta: &ServiceMeta) -> Result<(), HarvestError> {
        let store = self.store.as_ref();
        save_graph(store, GraphCollection::Service, &meta.fdk_id, &service.harvested).await?;

        let with_records = union(&service_record_graph(&self.harvester_uri, meta), &service.harvested);
        save_graph(store, GraphCollection::FdkService, &meta.fdk_id, &with_records).await?;
        Ok(())
    }

    async fn save_catalog_graphs(&self, catalog: &CatalogRecord, meta: &CatalogMeta) -> Result<(), HarvestError> {
        let store = self.store.as_ref();
        save_graph(store, GraphCollection::Catalog, &meta.fdk_id, &catalog.harvested).await?;

        let with_records = union(&catalog_record_graph(&self.harvester_uri, meta), &catalog.harvested);
        save_graph(store, GraphCollection::FdkCatalog, &meta.fdk_id, &with_records).await?;
        Ok(())
    }

    /// Points every member service at the catalog that lists it.
    async fn link_services_to_catalog(
        &self,
        services: &BTreeSet<String>,
        catalog_public_uri: &str,
    ) -> Result<(), HarvestError> {
        for uri in services {
            let Some(mut meta) = self.store.service_meta(uri).await? else {
                continue;
            };
            if meta.is_part_of.as_deref() != Some(catalog_public_uri) {
                meta.is_part_of = Some(catalog_public_uri.to_string());
                self.store.save_service_meta(meta).await?;
            }
        }
        Ok(())
    }

    async fn mark_removed_services(
        &self,
        catalog_public_uris: &BTreeSet<String>,
        harvested_uris: &BTreeSet<&str>,
        harvest_date: DateTime<Utc>,
    ) -> Result<Vec<FdkIdAndUri>, HarvestError> {
        let mut removed = Vec::new();

        for catalog in catalog_public_uris {
            for mut meta in self.store.service_metas_by_is_part_of(catalog).await? {
                if meta.removed || harvested_uris.contains(meta.uri.as_str()) {
                    continue;
                }

                info!(service = %meta.uri, catalog = %catalog, "Service no longer harvested, marking as removed");
                meta.removed = true;
                meta.modified = harvest_date;
                removed.push(FdkIdAndUri {
                    fdk_id: meta.fdk_id.clone(),
                    uri: meta.uri.clone(),
                });
                self.store.save_service_meta(meta).await?;
            }
        }

        Ok(removed)
    }
}
