//! Core types and errors for the harvest pipeline.
//!
//! - Split entities: [`ServiceRecord`], [`CatalogRecord`]
//! - Per-source failure taxonomy: [`HarvestError`]

use crate::rdf::RdfError;
use crate::store::StoreError;
use crate::traits::AdapterError;
use oxrdf::Graph;
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// Split Entities
// ============================================================================

/// One public service extracted from a harvested source graph.
///
/// `harvested` is self-contained: the service's own triples plus the value
/// objects it references, with blank nodes skolemized under `resource_uri`.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    /// IRI of the service resource (never a blank node)
    pub resource_uri: String,

    /// Minimal closure of the service in the source graph
    pub harvested: Graph,

    /// Whether some `dcat:Catalog` in the source lists this service
    pub is_member_of_any_catalog: bool,
}

/// One catalog extracted from a harvested source graph, or the generated
/// catalog that collects services listed by no catalog.
#[derive(Debug, Clone)]
pub struct CatalogRecord {
    /// IRI of the catalog resource
    pub resource_uri: String,

    /// Catalog triples without the member services' content
    ///
    /// `containsService` links are kept, but the services they point to are
    /// not inlined.
    pub harvested_without_services: Graph,

    /// `harvested_without_services` plus every member service's graph
    pub harvested: Graph,

    /// IRIs of the member services
    pub services: BTreeSet<String>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort the harvest of a single source.
///
/// None of these cross sources: the pipeline turns each one into a
/// `harvest_error = true` report for the source that failed.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The data source has no id or no URL
    #[error("Harvest source is not defined")]
    SourceUndefined,

    /// No usable accept header was configured for the source
    #[error("Not able to harvest from {url}, no accept header supplied")]
    MissingAcceptHeader { url: String },

    /// The configured accept header maps to no supported serialization
    #[error("Not able to harvest from {url}, header {header} is not acceptable")]
    UnacceptableAcceptHeader { url: String, header: String },

    /// Network failure or non-2xx response
    #[error("Not able to harvest from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: AdapterError,
    },

    /// The fetch did not complete in time
    #[error("Harvest of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The document is not valid RDF in the negotiated serialization
    #[error("{source}")]
    Parse {
        url: String,
        #[source]
        source: RdfError,
    },

    /// The source produced no services and empty sources are treated as errors
    #[error("No public services found in data harvested from {url}")]
    NoServicesFound { url: String },

    /// Reading or writing persisted state failed
    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),

    /// The blocking parse task panicked or was cancelled
    #[error("Harvest task failed: {0}")]
    Task(String),
}

impl HarvestError {
    /// Maps a negotiation failure from the codec to the source-level error.
    pub fn negotiation(url: &str, header: Option<&str>, error: RdfError) -> Self {
        match error {
            RdfError::UnacceptableAcceptHeader(header) => HarvestError::UnacceptableAcceptHeader {
                url: url.to_string(),
                header,
            },
            RdfError::MissingAcceptHeader => HarvestError::MissingAcceptHeader {
                url: url.to_string(),
            },
            other => HarvestError::UnacceptableAcceptHeader {
                url: url.to_string(),
                header: header.map(str::to_string).unwrap_or_else(|| other.to_string()),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_errors_keep_the_header() {
        let error = HarvestError::negotiation(
            "http://source",
            Some("application/json"),
            RdfError::UnacceptableAcceptHeader("application/json".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "Not able to harvest from http://source, header application/json is not acceptable"
        );

        let error = HarvestError::negotiation("http://source", None, RdfError::MissingAcceptHeader);
        assert!(matches!(error, HarvestError::MissingAcceptHeader { .. }));
    }

    #[test]
    fn test_parse_error_surfaces_parser_message() {
        let source = crate::rdf::parse_turtle("<a> <b> .").unwrap_err();
        let message = source.to_string();
        let error = HarvestError::Parse {
            url: "http://source".to_string(),
            source,
        };
        assert_eq!(error.to_string(), message);
    }
}
