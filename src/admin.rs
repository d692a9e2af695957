//! Manual maintenance of service metadata.
//!
//! These operations bypass harvesting and edit metadata directly. Every
//! change that downstream consumers must know about is announced with a
//! synthetic [`HarvestReport`].

use crate::model::{DuplicateIri, FdkIdAndUri, HarvestReport, ServiceMeta};
use crate::store::{GraphCollection, HarvestStore, StoreError};
use crate::traits::ReportPublisher;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("No service found with fdkID {0}")]
    NotFound(String),
    #[error("Service {0} has already been removed")]
    AlreadyRemoved(String),
    #[error("Unable to purge files, service with id {0} has not been removed")]
    NotRemoved(String),
    #[error("No service connected to IRI {0}")]
    UnknownIri(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AdminService {
    store: Arc<dyn HarvestStore>,
    publisher: Arc<dyn ReportPublisher>,
    harvester_uri: String,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn HarvestStore>,
        publisher: Arc<dyn ReportPublisher>,
        harvester_uri: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            harvester_uri: harvester_uri.into(),
        }
    }

    /// Marks every service with `fdk_id` as removed.
    #[instrument(skip(self))]
    pub async fn remove_service(&self, fdk_id: &str) -> Result<HarvestReport, AdminError> {
        let start = Utc::now();
        let metas = self.store.service_metas_by_fdk_id(fdk_id).await?;

        let Some(first) = metas.first() else {
            return Err(AdminError::NotFound(fdk_id.to_string()));
        };
        if metas.iter().all(|meta| meta.removed) {
            return Err(AdminError::AlreadyRemoved(fdk_id.to_string()));
        }
        let uri = first.uri.clone();

        for meta in metas.into_iter().filter(|meta| !meta.removed) {
            self.store
                .save_service_meta(ServiceMeta {
                    removed: true,
                    modified: Utc::now(),
                    ..meta
                })
                .await?;
        }

        let report = HarvestReport {
            removed_resources: vec![FdkIdAndUri {
                fdk_id: fdk_id.to_string(),
                uri: uri.clone(),
            }],
            ..HarvestReport::success(&format!("manual-delete-{fdk_id}"), &uri, start)
        };
        info!(uri = %uri, "Service manually removed");
        self.publisher.publish(std::slice::from_ref(&report)).await;

        Ok(report)
    }

    /// Merges each duplicate pair into the IRI to retain.
    ///
    /// The retained service keeps the earliest `issued` and latest `modified`
    /// of the pair. With `keep_removed_fdk_id` it also takes over the removed
    /// service's fdkId, and its own former id is reported as removed;
    /// otherwise the removed IRI's id is reported. Nothing is written unless
    /// every pair is valid.
    #[instrument(skip(self, duplicates), fields(pairs = duplicates.len()))]
    pub async fn remove_duplicates(
        &self,
        duplicates: &[DuplicateIri],
    ) -> Result<Option<HarvestReport>, AdminError> {
        let start = Utc::now();
        let mut updates = Vec::new();
        let mut report_as_removed = Vec::new();

        for duplicate in duplicates {
            let remove = self
                .store
                .service_meta(&duplicate.iri_to_remove)
                .await?
                .ok_or_else(|| AdminError::UnknownIri(duplicate.iri_to_remove.clone()))?;

            let retain = match self.store.service_meta(&duplicate.iri_to_retain).await? {
                Some(mut retain) => {
                    retain.issued = retain.issued.min(remove.issued);
                    retain.modified = retain.modified.max(remove.modified);

                    if duplicate.keep_removed_fdk_id {
                        if retain.removed {
                            return Err(AdminError::AlreadyRemoved(retain.uri));
                        }
                        report_as_removed.push(FdkIdAndUri {
                            fdk_id: retain.fdk_id.clone(),
                            uri: retain.uri.clone(),
                        });
                        retain.fdk_id = remove.fdk_id.clone();
                    } else {
                        if remove.removed {
                            return Err(AdminError::AlreadyRemoved(remove.uri));
                        }
                        report_as_removed.push(FdkIdAndUri {
                            fdk_id: remove.fdk_id.clone(),
                            uri: remove.uri.clone(),
                        });
                    }
                    retain
                }
                None => ServiceMeta {
                    uri: duplicate.iri_to_retain.clone(),
                    ..remove.clone()
                },
            };

            updates.push(ServiceMeta {
                removed: true,
                ..remove
            });
            updates.push(ServiceMeta {
                removed: false,
                ..retain
            });
        }

        for meta in updates {
            self.store.save_service_meta(meta).await?;
        }

        if report_as_removed.is_empty() {
            return Ok(None);
        }

        let report = HarvestReport {
            removed_resources: report_as_removed,
            ..HarvestReport::success(
                "duplicate-delete",
                &format!("{}/duplicates", self.harvester_uri),
                start,
            )
        };
        self.publisher.publish(std::slice::from_ref(&report)).await;

        Ok(Some(report))
    }

    /// Deletes the metadata and stored graphs of a removed service.
    #[instrument(skip(self))]
    pub async fn purge_by_fdk_id(&self, fdk_id: &str) -> Result<(), AdminError> {
        let metas = self.store.service_metas_by_fdk_id(fdk_id).await?;
        if metas.iter().any(|meta| !meta.removed) {
            return Err(AdminError::NotRemoved(fdk_id.to_string()));
        }

        for meta in &metas {
            self.store.delete_service_meta(&meta.uri).await?;
        }
        self.store.delete_graph(GraphCollection::Service, fdk_id).await?;
        self.store.delete_graph(GraphCollection::FdkService, fdk_id).await?;

        info!(services = metas.len(), "Purged removed service");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        reports: Mutex<Vec<HarvestReport>>,
    }

    #[async_trait]
    impl ReportPublisher for RecordingPublisher {
        async fn publish(&self, reports: &[HarvestReport]) {
            self.reports.lock().unwrap().extend_from_slice(reports);
        }
    }

    fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn meta(uri: &str, fdk_id: &str, removed: bool, issued: u32, modified: u32) -> ServiceMeta {
        ServiceMeta {
            uri: uri.to_string(),
            fdk_id: fdk_id.to_string(),
            is_part_of: None,
            removed,
            issued: day(issued),
            modified: day(modified),
        }
    }

    async fn setup(metas: Vec<ServiceMeta>) -> (Arc<InMemoryStore>, Arc<RecordingPublisher>, AdminService) {
        let store = Arc::new(InMemoryStore::new());
        for meta in metas {
            store.save_service_meta(meta).await.unwrap();
        }
        let publisher = Arc::new(RecordingPublisher::default());
        let admin = AdminService::new(store.clone(), publisher.clone(), "http://harvester.example.org");
        (store, publisher, admin)
    }

    #[tokio::test]
    async fn test_remove_service() {
        let (store, publisher, admin) = setup(vec![meta("http://s/1", "id-1", false, 1, 2)]).await;

        let report = admin.remove_service("id-1").await.unwrap();
        assert_eq!(report.id, "manual-delete-id-1");
        assert_eq!(report.url, "http://s/1");
        assert_eq!(report.removed_resources.len(), 1);
        assert!(store.service_meta("http://s/1").await.unwrap().unwrap().removed);
        assert_eq!(publisher.reports.lock().unwrap().len(), 1);

        assert!(matches!(
            admin.remove_service("id-1").await,
            Err(AdminError::AlreadyRemoved(_))
        ));
        assert!(matches!(
            admin.remove_service("unknown").await,
            Err(AdminError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_duplicates_keeping_removed_id() {
        let (store, _, admin) = setup(vec![
            meta("http://s/old", "old-id", false, 1, 3),
            meta("http://s/new", "new-id", false, 2, 5),
        ])
        .await;

        let report = admin
            .remove_duplicates(&[DuplicateIri {
                iri_to_retain: "http://s/new".to_string(),
                iri_to_remove: "http://s/old".to_string(),
                keep_removed_fdk_id: true,
            }])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.id, "duplicate-delete");
        assert_eq!(
            report.removed_resources,
            vec![FdkIdAndUri {
                fdk_id: "new-id".to_string(),
                uri: "http://s/new".to_string()
            }]
        );

        let retained = store.service_meta("http://s/new").await.unwrap().unwrap();
        assert_eq!(retained.fdk_id, "old-id");
        assert_eq!(retained.issued, day(1));
        assert_eq!(retained.modified, day(5));
        assert!(!retained.removed);
        assert!(store.service_meta("http://s/old").await.unwrap().unwrap().removed);
    }

    #[tokio::test]
    async fn test_remove_duplicates_rekeys_unknown_retained_iri() {
        let (store, publisher, admin) = setup(vec![meta("http://s/old", "old-id", false, 1, 3)]).await;

        let report = admin
            .remove_duplicates(&[DuplicateIri {
                iri_to_retain: "http://s/new".to_string(),
                iri_to_remove: "http://s/old".to_string(),
                keep_removed_fdk_id: false,
            }])
            .await
            .unwrap();

        assert!(report.is_none());
        assert!(publisher.reports.lock().unwrap().is_empty());
        let retained = store.service_meta("http://s/new").await.unwrap().unwrap();
        assert_eq!(retained.fdk_id, "old-id");
        assert!(!retained.removed);
    }

    #[tokio::test]
    async fn test_remove_duplicates_validates_before_writing() {
        let (store, _, admin) = setup(vec![
            meta("http://s/a", "a", false, 1, 1),
            meta("http://s/b", "b", false, 1, 1),
        ])
        .await;
        let writes = store.write_count();

        let result = admin
            .remove_duplicates(&[
                DuplicateIri {
                    iri_to_retain: "http://s/a".to_string(),
                    iri_to_remove: "http://s/b".to_string(),
                    keep_removed_fdk_id: true,
                },
                DuplicateIri {
                    iri_to_retain: "http://s/a".to_string(),
                    iri_to_remove: "http://s/missing".to_string(),
                    keep_removed_fdk_id: true,
                },
            ])
            .await;

        assert!(matches!(result, Err(AdminError::UnknownIri(_))));
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_purge_requires_removed_service() {
        let (store, _, admin) = setup(vec![meta("http://s/1", "id-1", false, 1, 1)]).await;
        store
            .save_graph(GraphCollection::Service, "id-1", String::new())
            .await
            .unwrap();

        assert!(matches!(
            admin.purge_by_fdk_id("id-1").await,
            Err(AdminError::NotRemoved(_))
        ));

        admin.remove_service("id-1").await.unwrap();
        admin.purge_by_fdk_id("id-1").await.unwrap();

        assert!(store.service_meta("http://s/1").await.unwrap().is_none());
        assert!(store.graph(GraphCollection::Service, "id-1").await.unwrap().is_none());
    }
}
