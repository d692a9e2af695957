use crate::model::{HarvestAdminParameters, HarvestDataSource, HarvestReport, Organization};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{url} responded with {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response body from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Lists the harvest targets matching `params`.
    async fn list_sources(
        &self,
        params: &HarvestAdminParameters,
    ) -> Result<Vec<HarvestDataSource>, AdapterError>;
}

#[async_trait]
pub trait RdfFetcher: Send + Sync {
    /// Fetches the raw RDF document at `url`. Non-2xx responses are errors.
    async fn fetch(&self, url: &str, accept: &str) -> Result<String, AdapterError>;
}

#[async_trait]
pub trait OrganizationResolver: Send + Sync {
    async fn organization(&self, id: &str) -> Result<Option<Organization>, AdapterError>;
}

/// Announces finished harvests. Implementations log failures instead of
/// returning them.
#[async_trait]
pub trait ReportPublisher: Send + Sync {
    async fn publish(&self, reports: &[HarvestReport]);
}
