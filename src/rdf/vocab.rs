//! RDF terms recognized by the harvester.
//!
//! Type IRIs that drive splitting decisions are modelled as the closed
//! [`EntityType`] enumeration; everything else is a plain predicate constant.

use oxrdf::NamedNodeRef;

pub use oxrdf::vocab::rdf::TYPE as RDF_TYPE;
pub use oxrdf::vocab::rdfs::LABEL as RDFS_LABEL;

// dcat
pub const DCAT_CATALOG: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#Catalog");
pub const DCAT_CATALOG_RECORD: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#CatalogRecord");
// dcatno
pub const DCATNO_CONTAINS_SERVICE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://data.norge.no/vocabulary/dcatno#containsService");
// dcterms
pub const DCT_AGENT: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("http://purl.org/dc/terms/Agent");
pub const DCT_PUBLISHER: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/publisher");
pub const DCT_IDENTIFIER: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");
pub const DCT_IS_PART_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/isPartOf");
pub const DCT_ISSUED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/issued");
pub const DCT_MODIFIED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/modified");
// foaf
pub const FOAF_PRIMARY_TOPIC: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://xmlns.com/foaf/0.1/primaryTopic");
// cv
pub const CV_PLAYS_ROLE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://data.europa.eu/m8g/playsRole");

/// Type IRIs with special meaning to the entity splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// `cpsv:PublicService`
    PublicService,
    /// `cpsvno:Service`
    Service,
    /// `cv:Event`
    Event,
    /// `cv:BusinessEvent`
    BusinessEvent,
    /// `cv:LifeEvent`
    LifeEvent,
    /// `cv:Participation`
    Participation,
}

const CPSV_PUBLIC_SERVICE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/vocab/cpsv#PublicService");
const CPSVNO_SERVICE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://data.norge.no/vocabulary/cpsvno#Service");
const CV_EVENT: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("http://data.europa.eu/m8g/Event");
const CV_BUSINESS_EVENT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://data.europa.eu/m8g/BusinessEvent");
const CV_LIFE_EVENT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://data.europa.eu/m8g/LifeEvent");
const CV_PARTICIPATION: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://data.europa.eu/m8g/Participation");

const ENTITY_TYPES: [(EntityType, NamedNodeRef<'static>); 6] = [
    (EntityType::PublicService, CPSV_PUBLIC_SERVICE),
    (EntityType::Service, CPSVNO_SERVICE),
    (EntityType::Event, CV_EVENT),
    (EntityType::BusinessEvent, CV_BUSINESS_EVENT),
    (EntityType::LifeEvent, CV_LIFE_EVENT),
    (EntityType::Participation, CV_PARTICIPATION),
];

impl EntityType {
    /// Types whose instances are harvested as services.
    pub const SERVICE_TYPES: [EntityType; 2] = [EntityType::PublicService, EntityType::Service];

    pub fn iri(self) -> NamedNodeRef<'static> {
        match self {
            EntityType::PublicService => CPSV_PUBLIC_SERVICE,
            EntityType::Service => CPSVNO_SERVICE,
            EntityType::Event => CV_EVENT,
            EntityType::BusinessEvent => CV_BUSINESS_EVENT,
            EntityType::LifeEvent => CV_LIFE_EVENT,
            EntityType::Participation => CV_PARTICIPATION,
        }
    }

    pub fn from_iri(iri: NamedNodeRef<'_>) -> Option<Self> {
        ENTITY_TYPES
            .iter()
            .find(|(_, known)| known.as_str() == iri.as_str())
            .map(|(kind, _)| *kind)
    }

    /// Top-level entities are never inlined into another entity's subgraph.
    pub fn is_boundary(self) -> bool {
        matches!(
            self,
            EntityType::PublicService
                | EntityType::Service
                | EntityType::Event
                | EntityType::BusinessEvent
                | EntityType::LifeEvent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table_round_trips_every_type() {
        for (kind, iri) in ENTITY_TYPES {
            assert_eq!(EntityType::from_iri(iri), Some(kind));
            assert_eq!(kind.iri(), iri);
        }
    }

    #[test]
    fn test_unknown_iri_is_not_recognized() {
        let iri = NamedNodeRef::new_unchecked("http://example.org/Thing");
        assert_eq!(EntityType::from_iri(iri), None);
    }

    #[test]
    fn test_boundary_classification() {
        assert!(EntityType::PublicService.is_boundary());
        assert!(EntityType::Service.is_boundary());
        assert!(EntityType::LifeEvent.is_boundary());
        assert!(!EntityType::Participation.is_boundary());
        assert!(EntityType::SERVICE_TYPES.iter().all(|kind| kind.is_boundary()));
    }
}
