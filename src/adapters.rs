//! HTTP and channel implementations of the external collaborator traits.

use crate::model::{HarvestAdminParameters, HarvestDataSource, HarvestReport, Organization};
use crate::traits::{AdapterError, OrganizationResolver, RdfFetcher, ReportPublisher, SourceRegistry};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "X-API-KEY";

async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<Option<T>, AdapterError> {
    let response = request
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|source| AdapterError::Request {
            url: url.to_string(),
            source,
        })?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(AdapterError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| AdapterError::InvalidBody {
            url: url.to_string(),
            message: e.to_string(),
        })
}

// ============================================================================
// Source documents
// ============================================================================

/// Downloads source documents with the data source's accept header.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, accept: &str) -> Result<String, AdapterError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|source| AdapterError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Source responded with error, harvest will be aborted");
            return Err(AdapterError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| AdapterError::Request {
            url: url.to_string(),
            source,
        })
    }
}

// ============================================================================
// Source registry
// ============================================================================

/// Lists data sources from the harvest admin service.
#[derive(Debug, Clone)]
pub struct HarvestAdminClient {
    client: Client,
    root_url: String,
    api_key: String,
}

impl HarvestAdminClient {
    pub fn new(client: Client, root_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            root_url: root_url.into(),
            api_key: api_key.into(),
        }
    }

    /// URL listing every data source matching `params`.
    pub fn datasources_url(&self, params: &HarvestAdminParameters) -> String {
        let path = match non_blank(&params.publisher_id) {
            Some(publisher_id) => format!("/internal/organizations/{publisher_id}/datasources"),
            None => "/internal/datasources".to_string(),
        };

        let query: Vec<String> = [
            ("dataType", non_blank(&params.data_type)),
            ("dataSourceType", non_blank(&params.data_source_type)),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| format!("{key}={value}")))
        .collect();

        if query.is_empty() {
            format!("{}{path}", self.root_url)
        } else {
            format!("{}{path}?{}", self.root_url, query.join("&"))
        }
    }

    /// URL of one data source, when both the source and its publisher are known.
    pub fn datasource_url(&self, params: &HarvestAdminParameters) -> Option<String> {
        let publisher_id = non_blank(&params.publisher_id)?;
        let data_source_id = non_blank(&params.data_source_id)?;
        Some(format!(
            "{}/internal/organizations/{publisher_id}/datasources/{data_source_id}",
            self.root_url
        ))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl SourceRegistry for HarvestAdminClient {
    async fn list_sources(
        &self,
        params: &HarvestAdminParameters,
    ) -> Result<Vec<HarvestDataSource>, AdapterError> {
        if let Some(url) = self.datasource_url(params) {
            let request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
            let source: Option<HarvestDataSource> = get_json(request, &url).await?;
            return Ok(source.into_iter().collect());
        }

        let url = self.datasources_url(params);
        debug!(url = %url, "Listing data sources");
        let request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
        let sources: Option<Vec<HarvestDataSource>> = get_json(request, &url).await?;
        Ok(sources.unwrap_or_default())
    }
}

// ============================================================================
// Organizations
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrganizationsClient {
    client: Client,
    organizations_uri: String,
}

impl OrganizationsClient {
    pub fn new(client: Client, organizations_uri: impl Into<String>) -> Self {
        Self {
            client,
            organizations_uri: organizations_uri.into(),
        }
    }
}

#[async_trait]
impl OrganizationResolver for OrganizationsClient {
    /// The returned organization's `uri` is the URI it was fetched from.
    async fn organization(&self, id: &str) -> Result<Option<Organization>, AdapterError> {
        let uri = format!("{}/{id}", self.organizations_uri);
        let organization: Option<Organization> = get_json(self.client.get(&uri), &uri).await?;

        Ok(organization.map(|organization| Organization {
            uri: Some(uri),
            ..organization
        }))
    }
}

// ============================================================================
// Report publishers
// ============================================================================

/// Writes every report to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl ReportPublisher for LoggingPublisher {
    async fn publish(&self, reports: &[HarvestReport]) {
        match serde_json::to_string(reports) {
            Ok(json) => info!(reports = reports.len(), body = %json, "Harvest reports"),
            Err(e) => warn!(error = %e, "Unable to encode harvest reports"),
        }
    }
}

/// Forwards each batch to a channel consumer, e.g. a message bus producer.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<Vec<HarvestReport>>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::Sender<Vec<HarvestReport>>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ReportPublisher for ChannelPublisher {
    async fn publish(&self, reports: &[HarvestReport]) {
        if let Err(e) = self.sender.send(reports.to_vec()).await {
            warn!(error = %e, "Unable to publish harvest reports");
        }
    }
}
