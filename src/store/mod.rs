//! Persistence seam for harvested graphs and entity metadata.
//!
//! Graphs are stored as Turtle text keyed by source URL, fdkId or
//! [`UNION_ID`]; metadata is keyed by entity URI. Every write is scoped to a
//! single key, so concurrent sources touching disjoint entities never
//! conflict. There are no cross-entity transactions: a crash mid-harvest is
//! repaired by the next (idempotent) harvest.

pub mod memory;

use crate::model::{CatalogMeta, ServiceMeta};
use crate::rdf::{self, RdfError};
use async_trait::async_trait;
use oxrdf::Graph;
use thiserror::Error;

pub use memory::InMemoryStore;

/// Key of the union graphs rebuilt after every harvest cycle.
pub const UNION_ID: &str = "union-graph";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphCollection {
    /// Last harvested source document, keyed by source URL
    HarvestSource,
    /// Service content only, keyed by fdkId
    Service,
    /// Service content with catalog record metadata, keyed by fdkId
    FdkService,
    /// Catalog content only, keyed by fdkId
    Catalog,
    /// Catalog content with catalog record metadata, keyed by fdkId
    FdkCatalog,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored graph {key} is unreadable: {source}")]
    CorruptGraph {
        key: String,
        #[source]
        source: RdfError,
    },
    #[error("failed to encode graph {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: RdfError,
    },
}

#[async_trait]
pub trait HarvestStore: Send + Sync {
    async fn graph(&self, collection: GraphCollection, key: &str)
        -> Result<Option<String>, StoreError>;
    async fn save_graph(
        &self,
        collection: GraphCollection,
        key: &str,
        turtle: String,
    ) -> Result<(), StoreError>;
    async fn delete_graph(&self, collection: GraphCollection, key: &str) -> Result<(), StoreError>;

    async fn service_meta(&self, uri: &str) -> Result<Option<ServiceMeta>, StoreError>;
    async fn service_metas_by_fdk_id(&self, fdk_id: &str) -> Result<Vec<ServiceMeta>, StoreError>;
    async fn service_metas_by_is_part_of(
        &self,
        catalog_uri: &str,
    ) -> Result<Vec<ServiceMeta>, StoreError>;
    async fn all_service_metas(&self) -> Result<Vec<ServiceMeta>, StoreError>;
    async fn save_service_meta(&self, meta: ServiceMeta) -> Result<(), StoreError>;
    async fn delete_service_meta(&self, uri: &str) -> Result<(), StoreError>;

    async fn catalog_meta(&self, uri: &str) -> Result<Option<CatalogMeta>, StoreError>;
    async fn catalog_metas_by_source(
        &self,
        source_url: &str,
    ) -> Result<Vec<CatalogMeta>, StoreError>;
    async fn all_catalog_metas(&self) -> Result<Vec<CatalogMeta>, StoreError>;
    async fn save_catalog_meta(&self, meta: CatalogMeta) -> Result<(), StoreError>;
}

/// Reads and parses a stored graph.
pub async fn load_graph(
    store: &dyn HarvestStore,
    collection: GraphCollection,
    key: &str,
) -> Result<Option<Graph>, StoreError> {
    match store.graph(collection, key).await? {
        Some(turtle) => rdf::parse_turtle(&turtle)
            .map(Some)
            .map_err(|source| StoreError::CorruptGraph {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub async fn save_graph(
    store: &dyn HarvestStore,
    collection: GraphCollection,
    key: &str,
    graph: &Graph,
) -> Result<(), StoreError> {
    let turtle = rdf::to_turtle(graph).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.save_graph(collection, key, turtle).await
}
