use super::{GraphCollection, HarvestStore, StoreError};
use crate::model::{CatalogMeta, ServiceMeta};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process-local [`HarvestStore`]. Counts writes so callers can verify that
/// an unchanged harvest touched nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    graphs: RwLock<HashMap<(GraphCollection, String), String>>,
    services: RwLock<HashMap<String, ServiceMeta>>,
    catalogs: RwLock<HashMap<String, CatalogMeta>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn sorted_by_uri<T, F>(mut items: Vec<T>, uri: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|a, b| uri(a).cmp(uri(b)));
    items
}

#[async_trait]
impl HarvestStore for InMemoryStore {
    async fn graph(
        &self,
        collection: GraphCollection,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        let graphs = self.graphs.read().await;
        Ok(graphs.get(&(collection, key.to_string())).cloned())
    }

    async fn save_graph(
        &self,
        collection: GraphCollection,
        key: &str,
        turtle: String,
    ) -> Result<(), StoreError> {
        self.graphs
            .write()
            .await
            .insert((collection, key.to_string()), turtle);
        self.record_write();
        Ok(())
    }

    async fn delete_graph(&self, collection: GraphCollection, key: &str) -> Result<(), StoreError> {
        self.graphs
            .write()
            .await
            .remove(&(collection, key.to_string()));
        self.record_write();
        Ok(())
    }

    async fn service_meta(&self, uri: &str) -> Result<Option<ServiceMeta>, StoreError> {
        Ok(self.services.read().await.get(uri).cloned())
    }

    async fn service_metas_by_fdk_id(&self, fdk_id: &str) -> Result<Vec<ServiceMeta>, StoreError> {
        let services = self.services.read().await;
        let matching: Vec<ServiceMeta> = services
            .values()
            .filter(|meta| meta.fdk_id == fdk_id)
            .cloned()
            .collect();
        Ok(sorted_by_uri(matching, |meta| meta.uri.as_str()))
    }

    async fn service_metas_by_is_part_of(
        &self,
        catalog_uri: &str,
    ) -> Result<Vec<ServiceMeta>, StoreError> {
        let services = self.services.read().await;
        let matching: Vec<ServiceMeta> = services
            .values()
            .filter(|meta| meta.is_part_of.as_deref() == Some(catalog_uri))
            .cloned()
            .collect();
        Ok(sorted_by_uri(matching, |meta| meta.uri.as_str()))
    }

    async fn all_service_metas(&self) -> Result<Vec<ServiceMeta>, StoreError> {
        let all: Vec<ServiceMeta> = self.services.read().await.values().cloned().collect();
        Ok(sorted_by_uri(all, |meta| meta.uri.as_str()))
    }

    async fn save_service_meta(&self, meta: ServiceMeta) -> Result<(), StoreError> {
        self.services.write().await.insert(meta.uri.clone(), meta);
        self.record_write();
        Ok(())
    }

    async fn delete_service_meta(&self, uri: &str) -> Result<(), StoreError> {
        self.services.write().await.remove(uri);
        self.record_write();
        Ok(())
    }

    async fn catalog_meta(&self, uri: &str) -> Result<Option<CatalogMeta>, StoreError> {
        Ok(self.catalogs.read().await.get(uri).cloned())
    }

    async fn catalog_metas_by_source(
        &self,
        source_url: &str,
    ) -> Result<Vec<CatalogMeta>, StoreError> {
        let catalogs = self.catalogs.read().await;
        let matching: Vec<CatalogMeta> = catalogs
            .values()
            .filter(|meta| meta.harvest_source.as_deref() == Some(source_url))
            .cloned()
            .collect();
        Ok(sorted_by_uri(matching, |meta| meta.uri.as_str()))
    }

    async fn all_catalog_metas(&self) -> Result<Vec<CatalogMeta>, StoreError> {
        let all: Vec<CatalogMeta> = self.catalogs.read().await.values().cloned().collect();
        Ok(sorted_by_uri(all, |meta| meta.uri.as_str()))
    }

    async fn save_catalog_meta(&self, meta: CatalogMeta) -> Result<(), StoreError> {
        self.catalogs.write().await.insert(meta.uri.clone(), meta);
        self.record_write();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service(uri: &str, fdk_id: &str, is_part_of: Option<&str>) -> ServiceMeta {
        ServiceMeta {
            uri: uri.to_string(),
            fdk_id: fdk_id.to_string(),
            is_part_of: is_part_of.map(str::to_string),
            removed: false,
            issued: Utc::now(),
            modified: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_service_meta_queries() {
        let store = InMemoryStore::new();
        store
            .save_service_meta(service("http://s/2", "id-2", Some("http://c")))
            .await
            .unwrap();
        store
            .save_service_meta(service("http://s/1", "id-1", Some("http://c")))
            .await
            .unwrap();
        store
            .save_service_meta(service("http://s/3", "id-1", None))
            .await
            .unwrap();

        let in_catalog = store.service_metas_by_is_part_of("http://c").await.unwrap();
        let uris: Vec<&str> = in_catalog.iter().map(|m| m.uri.as_str()).collect();
        assert_eq!(uris, vec!["http://s/1", "http://s/2"]);

        assert_eq!(store.service_metas_by_fdk_id("id-1").await.unwrap().len(), 2);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_graphs_are_scoped_by_collection() {
        let store = InMemoryStore::new();
        store
            .save_graph(GraphCollection::Service, "id", "a".to_string())
            .await
            .unwrap();

        assert_eq!(
            store.graph(GraphCollection::Service, "id").await.unwrap(),
            Some("a".to_string())
        );
        assert_eq!(store.graph(GraphCollection::FdkService, "id").await.unwrap(), None);

        store.delete_graph(GraphCollection::Service, "id").await.unwrap();
        assert_eq!(store.graph(GraphCollection::Service, "id").await.unwrap(), None);
    }
}
