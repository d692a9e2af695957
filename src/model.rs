use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Data type of the sources this harvester is responsible for.
pub const PUBLIC_SERVICE_DATA_TYPE: &str = "publicService";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMeta {
    pub uri: String,
    pub fdk_id: String,
    /// Public URI of the owning catalog record
    pub is_part_of: Option<String>,
    #[serde(default)]
    pub removed: bool,
    pub issued: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMeta {
    pub uri: String,
    pub fdk_id: String,
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub removed: bool,
    pub issued: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// URL of the source the catalog was last harvested from
    #[serde(default)]
    pub harvest_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdkIdAndUri {
    pub fdk_id: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub id: String,
    pub url: String,
    pub data_type: String,
    pub harvest_error: bool,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub changed_catalogs: Vec<FdkIdAndUri>,
    #[serde(default)]
    pub changed_resources: Vec<FdkIdAndUri>,
    #[serde(default)]
    pub removed_resources: Vec<FdkIdAndUri>,
}

impl HarvestReport {
    /// Report for a harvest that completed, with nothing changed yet.
    pub fn success(id: &str, url: &str, start: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            data_type: PUBLIC_SERVICE_DATA_TYPE.to_string(),
            harvest_error: false,
            start_time: format_timestamp(start),
            end_time: format_timestamp(Utc::now()),
            error_message: None,
            changed_catalogs: Vec::new(),
            changed_resources: Vec::new(),
            removed_resources: Vec::new(),
        }
    }

    pub fn error(id: &str, url: &str, start: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            harvest_error: true,
            error_message: Some(message.into()),
            ..Self::success(id, url, start)
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.changed_catalogs.is_empty()
            && self.changed_resources.is_empty()
            && self.removed_resources.is_empty())
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S %z").to_string()
}

/// A harvest target as listed by the source registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestDataSource {
    pub id: Option<String>,
    pub url: Option<String>,
    pub data_type: Option<String>,
    pub data_source_type: Option<String>,
    pub accept_header_value: Option<String>,
    pub publisher_id: Option<String>,
}

/// Filter for a harvest trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestAdminParameters {
    pub data_source_id: Option<String>,
    pub publisher_id: Option<String>,
    pub data_source_type: Option<String>,
    pub data_type: Option<String>,
}

impl Default for HarvestAdminParameters {
    fn default() -> Self {
        Self {
            data_source_id: None,
            publisher_id: None,
            data_source_type: None,
            data_type: Some(PUBLIC_SERVICE_DATA_TYPE.to_string()),
        }
    }
}

impl HarvestAdminParameters {
    pub fn harvest_all_services(&self) -> bool {
        self.data_source_id.is_none() && self.publisher_id.is_none() && self.data_source_type.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    pub organization_id: Option<String>,
    pub uri: Option<String>,
    pub name: Option<String>,
    pub pref_label: Option<PrefLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefLabel {
    pub nb: Option<String>,
    pub nn: Option<String>,
    pub en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateIri {
    pub iri_to_retain: String,
    pub iri_to_remove: String,
    #[serde(default = "keep_removed_fdk_id_default")]
    pub keep_removed_fdk_id: bool,
}

fn keep_removed_fdk_id_default() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_ignores_unknown_fields() {
        let json = r#"{"id":"s1","url":"http://x","dataType":"publicService","extra":1}"#;
        let source: HarvestDataSource = serde_json::from_str(json).unwrap();
        assert_eq!(source.id.as_deref(), Some("s1"));
        assert_eq!(source.accept_header_value, None);
    }

    #[test]
    fn test_error_report_serializes_camel_case() {
        let report = HarvestReport::error("s1", "http://x", Utc::now(), "boom");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["harvestError"], true);
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["dataType"], PUBLIC_SERVICE_DATA_TYPE);
        assert!(!report.has_changes());
    }

    #[test]
    fn test_duplicate_iri_defaults_to_keeping_removed_id() {
        let json = r#"{"iriToRetain":"a","iriToRemove":"b"}"#;
        let duplicate: DuplicateIri = serde_json::from_str(json).unwrap();
        assert!(duplicate.keep_removed_fdk_id);
    }

    #[test]
    fn test_default_parameters_harvest_everything() {
        let params = HarvestAdminParameters::default();
        assert!(params.harvest_all_services());
        assert_eq!(params.data_type.as_deref(), Some(PUBLIC_SERVICE_DATA_TYPE));
    }
}
