//! Catalog record metadata and union graphs.
//!
//! Every persisted entity is exposed in two variants: its harvested content,
//! and that content joined with `dcat:CatalogRecord` triples describing when
//! the harvester first and last saw it. After each cycle the record variants
//! are rebuilt from stored metadata so services carry their owning catalog's
//! record, and the union graphs are recomputed from every live entity.

use super::splitter::extract_catalog_graph;
use crate::model::{CatalogMeta, ServiceMeta};
use crate::rdf::vocab::{
    DCATNO_CONTAINS_SERVICE, DCAT_CATALOG_RECORD, DCT_IDENTIFIER, DCT_IS_PART_OF, DCT_ISSUED,
    DCT_MODIFIED, FOAF_PRIMARY_TOPIC, RDF_TYPE,
};
use crate::store::{load_graph, save_graph, GraphCollection, HarvestStore, StoreError, UNION_ID};
use chrono::{DateTime, SecondsFormat, Utc};
use oxrdf::vocab::xsd;
use oxrdf::{Graph, Literal, NamedNode, NamedNodeRef, TripleRef};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Public URI of a service record.
pub fn service_fdk_uri(harvester_uri: &str, fdk_id: &str) -> String {
    format!("{harvester_uri}/{fdk_id}")
}

/// Public URI of a catalog record. Services point at it through `isPartOf`.
pub fn catalog_fdk_uri(harvester_uri: &str, fdk_id: &str) -> String {
    format!("{harvester_uri}/catalogs/{fdk_id}")
}

pub fn service_record_graph(harvester_uri: &str, meta: &ServiceMeta) -> Graph {
    let mut graph = record_graph(
        &service_fdk_uri(harvester_uri, &meta.fdk_id),
        &meta.fdk_id,
        &meta.uri,
        meta.issued,
        meta.modified,
    );

    if let Some(catalog) = &meta.is_part_of {
        let record = NamedNode::new_unchecked(service_fdk_uri(harvester_uri, &meta.fdk_id));
        let catalog = NamedNode::new_unchecked(catalog.as_str());
        graph.insert(TripleRef::new(&record, DCT_IS_PART_OF, &catalog));
    }

    graph
}

pub fn catalog_record_graph(harvester_uri: &str, meta: &CatalogMeta) -> Graph {
    record_graph(
        &catalog_fdk_uri(harvester_uri, &meta.fdk_id),
        &meta.fdk_id,
        &meta.uri,
        meta.issued,
        meta.modified,
    )
}

fn record_graph(
    record_uri: &str,
    fdk_id: &str,
    primary_topic: &str,
    issued: DateTime<Utc>,
    modified: DateTime<Utc>,
) -> Graph {
    let record = NamedNode::new_unchecked(record_uri);
    let topic = NamedNode::new_unchecked(primary_topic);
    let identifier = Literal::new_simple_literal(fdk_id);
    let issued = date_time_literal(issued);
    let modified = date_time_literal(modified);

    let mut graph = Graph::new();
    graph.insert(TripleRef::new(&record, RDF_TYPE, DCAT_CATALOG_RECORD));
    graph.insert(TripleRef::new(&record, DCT_IDENTIFIER, &identifier));
    graph.insert(TripleRef::new(&record, FOAF_PRIMARY_TOPIC, &topic));
    graph.insert(TripleRef::new(&record, DCT_ISSUED, &issued));
    graph.insert(TripleRef::new(&record, DCT_MODIFIED, &modified));
    graph
}

fn date_time_literal(timestamp: DateTime<Utc>) -> Literal {
    Literal::new_typed_literal(
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        xsd::DATE_TIME,
    )
}

/// Rebuilds the record variants of every catalog and its live services,
/// then the union graphs.
#[instrument(skip(store))]
pub async fn rebuild_metadata(store: &dyn HarvestStore, harvester_uri: &str) -> Result<(), StoreError> {
    let start = Instant::now();

    for catalog in store.all_catalog_metas().await? {
        let Some(content) = load_graph(store, GraphCollection::Catalog, &catalog.fdk_id).await? else {
            debug!(catalog = %catalog.uri, "No stored content for catalog, skipping");
            continue;
        };

        let catalog_node = NamedNode::new_unchecked(catalog.uri.as_str());
        let catalog_record = catalog_record_graph(harvester_uri, &catalog);

        let mut catalog_triples = extract_catalog_graph(&content, catalog_node.as_ref());
        catalog_triples.extend(catalog_record.iter());

        let mut complete = catalog_record.clone();
        let public_uri = catalog_fdk_uri(harvester_uri, &catalog.fdk_id);

        for service in store.service_metas_by_is_part_of(&public_uri).await? {
            if service.removed || !catalog_contains_service(&content, catalog_node.as_ref(), &service.uri) {
                continue;
            }

            let service_record = service_record_graph(harvester_uri, &service);
            complete.extend(service_record.iter());

            if let Some(service_content) =
                load_graph(store, GraphCollection::Service, &service.fdk_id).await?
            {
                let mut with_records = catalog_triples.clone();
                with_records.extend(service_record.iter());
                with_records.extend(service_content.iter());
                save_graph(store, GraphCollection::FdkService, &service.fdk_id, &with_records).await?;
            }
        }

        complete.extend(content.iter());
        save_graph(store, GraphCollection::FdkCatalog, &catalog.fdk_id, &complete).await?;
    }

    rebuild_union_graphs(store).await?;

    info!(
        duration_ms = start.elapsed().as_millis() as u64,
        "Metadata rebuilt"
    );
    Ok(())
}

fn catalog_contains_service(content: &Graph, catalog: NamedNodeRef<'_>, service_uri: &str) -> bool {
    content.contains(TripleRef::new(
        catalog,
        DCATNO_CONTAINS_SERVICE,
        NamedNodeRef::new_unchecked(service_uri),
    ))
}

/// Recomputes the four union graphs from every entity that is not removed.
/// Catalogs without services are left out.
pub async fn rebuild_union_graphs(store: &dyn HarvestStore) -> Result<(), StoreError> {
    let mut services = Graph::new();
    let mut services_no_records = Graph::new();
    for meta in store.all_service_metas().await? {
        if meta.removed {
            continue;
        }
        if let Some(graph) = load_graph(store, GraphCollection::FdkService, &meta.fdk_id).await? {
            services.extend(graph.iter());
        }
        if let Some(graph) = load_graph(store, GraphCollection::Service, &meta.fdk_id).await? {
            services_no_records.extend(graph.iter());
        }
    }
    save_graph(store, GraphCollection::FdkService, UNION_ID, &services).await?;
    save_graph(store, GraphCollection::Service, UNION_ID, &services_no_records).await?;

    let mut catalogs = Graph::new();
    let mut catalogs_no_records = Graph::new();
    for meta in store.all_catalog_metas().await? {
        if meta.removed || meta.services.is_empty() {
            continue;
        }
        if let Some(graph) = load_graph(store, GraphCollection::FdkCatalog, &meta.fdk_id).await? {
            catalogs.extend(graph.iter());
        }
        if let Some(graph) = load_graph(store, GraphCollection::Catalog, &meta.fdk_id).await? {
            catalogs_no_records.extend(graph.iter());
        }
    }
    save_graph(store, GraphCollection::FdkCatalog, UNION_ID, &catalogs).await?;
    save_graph(store, GraphCollection::Catalog, UNION_ID, &catalogs_no_records).await?;

    Ok(())
}
