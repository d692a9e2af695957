//! Splits one harvested source graph into self-contained service and catalog
//! subgraphs.
//!
//! Each entity's subgraph is a bounded closure: its own triples plus the
//! value objects it references, recursively, up to a fixed depth. Resources
//! that are entities in their own right (recognized top-level types, or any
//! IRI typed elsewhere in the source) are linked to but never inlined.
//!
//! Splitting never fails. Services and catalogs identified by blank nodes
//! cannot be addressed across harvests, so they are logged and dropped.

use super::traits::{CatalogRecord, ServiceRecord};
use crate::model::Organization;
use crate::rdf::skolemize;
use crate::rdf::vocab::{
    EntityType, CV_PLAYS_ROLE, DCATNO_CONTAINS_SERVICE, DCAT_CATALOG, DCT_AGENT, DCT_PUBLISHER,
    RDFS_LABEL, RDF_TYPE,
};
use crate::rdf::union;
use oxrdf::{Graph, Literal, NamedNode, NamedNodeRef, SubjectRef, TermRef, TripleRef};
use std::collections::BTreeSet;
use tracing::warn;

/// Recursion depth for the closure of a service.
pub const SERVICE_CLOSURE_DEPTH: usize = 10;

/// Recursion depth for the closure of a catalog.
pub const CATALOG_CLOSURE_DEPTH: usize = 5;

/// URI of the catalog that collects a source's uncatalogued services.
pub fn generated_catalog_uri(source_url: &str) -> String {
    format!("{source_url}#GeneratedCatalog")
}

/// Extracts every public service in `graph`.
pub fn split_services(graph: &Graph, source_url: &str) -> Vec<ServiceRecord> {
    let mut services = BTreeSet::new();
    for kind in EntityType::SERVICE_TYPES {
        services.extend(named_resources(
            graph.subjects_for_predicate_object(RDF_TYPE, kind.iri()),
            source_url,
        ));
    }

    services
        .iter()
        .map(|service| extract_service(graph, service.as_ref()))
        .collect()
}

/// Extracts every catalog in `graph` that lists at least one service, plus
/// the generated catalog for services no catalog lists.
///
/// The generated catalog is always returned, even when empty, so the
/// source keeps a stable catalog identity across harvests.
pub fn split_catalogs(
    graph: &Graph,
    services: &[ServiceRecord],
    source_url: &str,
    organization: Option<&Organization>,
) -> Vec<CatalogRecord> {
    let catalogs: BTreeSet<NamedNode> = named_resources(
        graph.subjects_for_predicate_object(RDF_TYPE, DCAT_CATALOG),
        source_url,
    )
    .into_iter()
    .filter(|catalog| {
        graph
            .objects_for_subject_predicate(catalog, DCATNO_CONTAINS_SERVICE)
            .next()
            .is_some()
    })
    .collect();

    let mut records: Vec<CatalogRecord> = catalogs
        .iter()
        .map(|catalog| {
            let members: BTreeSet<String> = named_resources(
                graph
                    .objects_for_subject_predicate(catalog, DCATNO_CONTAINS_SERVICE)
                    .filter_map(as_subject),
                source_url,
            )
            .into_iter()
            .map(NamedNode::into_string)
            .collect();

            let harvested_without_services =
                skolemize(extract_catalog_graph(graph, catalog.as_ref()), catalog.as_str());

            let harvested = services
                .iter()
                .filter(|service| members.contains(&service.resource_uri))
                .fold(harvested_without_services.clone(), |acc, service| {
                    union(&acc, &service.harvested)
                });

            CatalogRecord {
                resource_uri: catalog.as_str().to_string(),
                harvested_without_services,
                harvested,
                services: members,
            }
        })
        .collect();

    let orphans: Vec<&ServiceRecord> = services
        .iter()
        .filter(|service| !service.is_member_of_any_catalog)
        .collect();
    records.push(generated_catalog(&orphans, source_url, organization));

    records
}

/// The catalog's own triples and value objects, without inlining the
/// services it contains. `containsService` links to IRIs are kept.
pub fn extract_catalog_graph(graph: &Graph, catalog: NamedNodeRef<'_>) -> Graph {
    let mut catalog_graph = Graph::new();

    for triple in graph.triples_for_subject(catalog) {
        if triple.predicate != DCATNO_CONTAINS_SERVICE {
            catalog_graph.insert(triple);
            if let Some(object) = as_subject(triple.object) {
                add_non_boundary_resource(graph, &mut catalog_graph, object, CATALOG_CLOSURE_DEPTH);
            }
        } else if matches!(triple.object, TermRef::NamedNode(_)) {
            catalog_graph.insert(triple);
        }
    }

    catalog_graph
}

fn extract_service(graph: &Graph, service: NamedNodeRef<'_>) -> ServiceRecord {
    let mut service_graph = Graph::new();
    service_graph.extend(graph.triples_for_subject(service));

    for object in resource_objects(graph, service.into()) {
        add_non_boundary_resource(graph, &mut service_graph, object, SERVICE_CLOSURE_DEPTH);
    }

    ServiceRecord {
        resource_uri: service.as_str().to_string(),
        harvested: skolemize(service_graph, service.as_str()),
        is_member_of_any_catalog: is_member_of_any_catalog(graph, service),
    }
}

/// Copies `resource` into `out` unless it is an entity of its own, then
/// follows its resource-valued properties until `depth` is spent.
fn add_non_boundary_resource(graph: &Graph, out: &mut Graph, resource: SubjectRef<'_>, depth: usize) {
    let types = entity_types(graph, resource);

    if should_be_added(graph, resource, &types) {
        out.extend(graph.triples_for_subject(resource));

        if depth > 1 {
            for object in resource_objects(graph, resource) {
                add_non_boundary_resource(graph, out, object, depth - 1);
            }
        }
    }

    if types.contains(&EntityType::Participation) {
        add_agents_playing_role(graph, out, resource);
    }
}

fn entity_types(graph: &Graph, resource: SubjectRef<'_>) -> Vec<EntityType> {
    graph
        .objects_for_subject_predicate(resource, RDF_TYPE)
        .filter_map(|object| match object {
            TermRef::NamedNode(iri) => EntityType::from_iri(iri),
            _ => None,
        })
        .collect()
}

fn should_be_added(graph: &Graph, resource: SubjectRef<'_>, types: &[EntityType]) -> bool {
    if types.iter().any(|kind| kind.is_boundary()) {
        return false;
    }
    match resource {
        SubjectRef::NamedNode(_) => graph
            .objects_for_subject_predicate(resource, RDF_TYPE)
            .next()
            .is_none(),
        _ => true,
    }
}

/// Agents reference a participation through `cv:playsRole`, pointing from
/// the agent to the participation, so they are not reached by following
/// properties forward.
fn add_agents_playing_role(graph: &Graph, out: &mut Graph, participation: SubjectRef<'_>) {
    let role = TermRef::from(participation);

    let agents: Vec<SubjectRef<'_>> = graph
        .subjects_for_predicate_object(CV_PLAYS_ROLE, role)
        .filter(|agent| graph.contains(TripleRef::new(*agent, RDF_TYPE, DCT_AGENT)))
        .collect();

    for agent in agents {
        out.extend(graph.triples_for_subject(agent));
        for object in resource_objects(graph, agent) {
            if should_be_added(graph, object, &entity_types(graph, object)) {
                out.extend(graph.triples_for_subject(object));
            }
        }
    }
}

fn is_member_of_any_catalog(graph: &Graph, service: NamedNodeRef<'_>) -> bool {
    graph
        .subjects_for_predicate_object(DCATNO_CONTAINS_SERVICE, service)
        .any(|catalog| graph.contains(TripleRef::new(catalog, RDF_TYPE, DCAT_CATALOG)))
}

fn generated_catalog(
    services: &[&ServiceRecord],
    source_url: &str,
    organization: Option<&Organization>,
) -> CatalogRecord {
    let uri = generated_catalog_uri(source_url);
    let catalog = NamedNode::new_unchecked(uri.clone());
    let service_uris: BTreeSet<String> = services
        .iter()
        .map(|service| service.resource_uri.clone())
        .collect();

    let mut without_services = Graph::new();
    without_services.insert(TripleRef::new(&catalog, RDF_TYPE, DCAT_CATALOG));

    if let Some(publisher) = organization.and_then(|org| org.uri.as_deref()) {
        let publisher = NamedNode::new_unchecked(publisher);
        without_services.insert(TripleRef::new(&catalog, DCT_PUBLISHER, &publisher));
    }

    for label in generated_catalog_labels(organization) {
        without_services.insert(TripleRef::new(&catalog, RDFS_LABEL, &label));
    }

    for service in &service_uris {
        let service = NamedNode::new_unchecked(service.as_str());
        without_services.insert(TripleRef::new(&catalog, DCATNO_CONTAINS_SERVICE, &service));
    }

    let harvested = services
        .iter()
        .fold(without_services.clone(), |acc, service| {
            union(&acc, &service.harvested)
        });

    CatalogRecord {
        resource_uri: uri,
        harvested_without_services: without_services,
        harvested,
        services: service_uris,
    }
}

fn generated_catalog_labels(organization: Option<&Organization>) -> Vec<Literal> {
    let Some(organization) = organization else {
        return Vec::new();
    };
    let pref_label = organization.pref_label.clone().unwrap_or_default();

    [
        ("nb", pref_label.nb, "Tjenestekatalog"),
        ("nn", pref_label.nn, "Tjenestekatalog"),
        ("en", pref_label.en, "Service catalog"),
    ]
    .into_iter()
    .filter_map(|(language, name, suffix)| {
        name.or_else(|| organization.name.clone())
            .filter(|name| !name.trim().is_empty())
            .map(|name| {
                Literal::new_language_tagged_literal_unchecked(format!("{name} - {suffix}"), language)
            })
    })
    .collect()
}

fn named_resources<'a>(
    resources: impl Iterator<Item = SubjectRef<'a>>,
    source_url: &str,
) -> BTreeSet<NamedNode> {
    resources
        .filter_map(|resource| match resource {
            SubjectRef::NamedNode(node) => Some(node.into_owned()),
            _ => {
                warn!(source_url, "Blank node service or catalog filtered");
                None
            }
        })
        .collect()
}

fn as_subject(term: TermRef<'_>) -> Option<SubjectRef<'_>> {
    match term {
        TermRef::NamedNode(node) => Some(node.into()),
        TermRef::BlankNode(node) => Some(node.into()),
        _ => None,
    }
}

fn resource_objects<'a>(graph: &'a Graph, resource: SubjectRef<'_>) -> Vec<SubjectRef<'a>> {
    graph
        .triples_for_subject(resource)
        .filter_map(|triple| as_subject(triple.object))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrefLabel;
    use crate::rdf::parse_turtle;

    const SOURCE_URL: &str = "http://source.example.org/services";

    const SOURCE: &str = r#"
        @prefix cpsv: <http://purl.org/vocab/cpsv#> .
        @prefix cpsvno: <https://data.norge.no/vocabulary/cpsvno#> .
        @prefix cv: <http://data.europa.eu/m8g/> .
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dcatno: <https://data.norge.no/vocabulary/dcatno#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix ex: <http://example.org/> .

        ex:catalog a dcat:Catalog ;
            dct:title "Catalog" ;
            dct:publisher ex:org ;
            dcatno:containsService ex:service1 , [ a cpsvno:Service ] .

        ex:org a dct:Agent ; dct:title "Org" .

        ex:service1 a cpsvno:Service ;
            dct:title "Service 1" ;
            cv:hasContactPoint [ ex:email "post@example.org" ] ;
            cv:isGroupedBy ex:event ;
            cv:hasParticipation ex:participation ;
            ex:requirement ex:req .

        ex:event a cv:Event ; dct:title "Event" .
        ex:req ex:name "Requirement" .
        ex:participation a cv:Participation ; dct:description "Role" .
        ex:agent a dct:Agent ;
            cv:playsRole ex:participation ;
            dct:title "Agent" ;
            ex:address ex:addr .
        ex:addr ex:street "Main" .

        ex:service2 a cpsv:PublicService ;
            dct:title "Service 2" ;
            cv:follows ex:service1 .

        [] a cpsv:PublicService ; dct:title "Blank" .
    "#;

    fn subjects(graph: &Graph) -> BTreeSet<String> {
        graph.iter().map(|t| t.subject.to_string()).collect()
    }

    fn find<'a, T>(records: &'a [T], uri: &str, key: impl Fn(&T) -> &str) -> &'a T {
        records
            .iter()
            .find(|record| key(record) == uri)
            .expect("record should be present")
    }

    #[test]
    fn test_blank_node_services_are_dropped() {
        let graph = parse_turtle(SOURCE).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let uris: Vec<&str> = services.iter().map(|s| s.resource_uri.as_str()).collect();
        assert_eq!(uris, vec!["http://example.org/service1", "http://example.org/service2"]);
    }

    #[test]
    fn test_service_closure_stops_at_boundaries() {
        let graph = parse_turtle(SOURCE).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let service1 = find(&services, "http://example.org/service1", |s| &s.resource_uri);

        let subjects = subjects(&service1.harvested);
        assert!(subjects.contains("<http://example.org/req>"));
        assert!(!subjects.contains("<http://example.org/event>"));
        assert!(!subjects.contains("<http://example.org/participation>"));
        assert!(service1.is_member_of_any_catalog);
        // own 6 + contact point 1 + requirement 1 + agent 4 + address 1
        assert_eq!(service1.harvested.len(), 13);

        let service2 = find(&services, "http://example.org/service2", |s| &s.resource_uri);
        assert_eq!(service2.harvested.len(), 3);
        assert!(!service2.is_member_of_any_catalog);
    }

    #[test]
    fn test_participation_pulls_in_agents() {
        let graph = parse_turtle(SOURCE).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let service1 = find(&services, "http://example.org/service1", |s| &s.resource_uri);

        let subjects = subjects(&service1.harvested);
        assert!(subjects.contains("<http://example.org/agent>"));
        assert!(subjects.contains("<http://example.org/addr>"));
    }

    #[test]
    fn test_agent_properties_stop_at_typed_resources() {
        let ttl = r#"
            @prefix cpsvno: <https://data.norge.no/vocabulary/cpsvno#> .
            @prefix cv: <http://data.europa.eu/m8g/> .
            @prefix dct: <http://purl.org/dc/terms/> .
            @prefix ex: <http://example.org/> .

            ex:service a cpsvno:Service ; cv:hasParticipation ex:role .
            ex:role a cv:Participation ; dct:description "Role" .
            ex:agent a dct:Agent ;
                cv:playsRole ex:role ;
                ex:organizes ex:event ;
                ex:address ex:addr .
            ex:event a cv:Event ; dct:title "Event" .
            ex:addr ex:street "Main" .
        "#;
        let graph = parse_turtle(ttl).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let service = find(&services, "http://example.org/service", |s| &s.resource_uri);

        let subjects = subjects(&service.harvested);
        assert!(subjects.contains("<http://example.org/agent>"));
        assert!(subjects.contains("<http://example.org/addr>"));
        assert!(!subjects.contains("<http://example.org/role>"));
        assert!(!subjects.contains("<http://example.org/event>"));
        // service 2 + agent 4 + address 1
        assert_eq!(service.harvested.len(), 7);
    }

    #[test]
    fn test_service_blank_nodes_are_skolemized_under_service_uri() {
        let graph = parse_turtle(SOURCE).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let service1 = find(&services, "http://example.org/service1", |s| &s.resource_uri);

        assert!(subjects(&service1.harvested)
            .iter()
            .any(|s| s.starts_with("<http://example.org/service1/.well-known/skolem/")));
        assert!(!subjects(&service1.harvested).iter().any(|s| s.starts_with("_:")));
    }

    #[test]
    fn test_catalogs_and_generated_catalog() {
        let graph = parse_turtle(SOURCE).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let catalogs = split_catalogs(&graph, &services, SOURCE_URL, None);
        assert_eq!(catalogs.len(), 2);

        let catalog = find(&catalogs, "http://example.org/catalog", |c| &c.resource_uri);
        assert_eq!(
            catalog.services,
            BTreeSet::from(["http://example.org/service1".to_string()])
        );
        // a, title, publisher, containsService service1
        assert_eq!(catalog.harvested_without_services.len(), 4);
        assert_eq!(catalog.harvested.len(), 4 + 13);

        let generated_uri = generated_catalog_uri(SOURCE_URL);
        let generated = find(&catalogs, &generated_uri, |c| &c.resource_uri);
        assert_eq!(
            generated.services,
            BTreeSet::from(["http://example.org/service2".to_string()])
        );
        assert_eq!(generated.harvested_without_services.len(), 2);
        assert_eq!(generated.harvested.len(), 2 + 3);
    }

    #[test]
    fn test_generated_catalog_exists_without_orphans() {
        let ttl = r#"
            @prefix dcat: <http://www.w3.org/ns/dcat#> .
            @prefix dcatno: <https://data.norge.no/vocabulary/dcatno#> .
            @prefix cpsvno: <https://data.norge.no/vocabulary/cpsvno#> .
            <http://example.org/c> a dcat:Catalog ;
                dcatno:containsService <http://example.org/s> .
            <http://example.org/s> a cpsvno:Service .
        "#;
        let graph = parse_turtle(ttl).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let catalogs = split_catalogs(&graph, &services, SOURCE_URL, None);

        let generated = find(&catalogs, &generated_catalog_uri(SOURCE_URL), |c| &c.resource_uri);
        assert!(generated.services.is_empty());
        assert_eq!(generated.harvested.len(), 1);
    }

    #[test]
    fn test_generated_catalog_labels_fall_back_to_name() {
        let organization = Organization {
            organization_id: Some("123456789".to_string()),
            uri: Some("http://orgs.example.org/123456789".to_string()),
            name: Some("Etaten".to_string()),
            pref_label: Some(PrefLabel {
                nb: None,
                nn: Some("Etaten nn".to_string()),
                en: Some("The Agency".to_string()),
            }),
        };

        let graph = Graph::new();
        let catalogs = split_catalogs(&graph, &[], SOURCE_URL, Some(&organization));
        assert_eq!(catalogs.len(), 1);

        let labels: BTreeSet<String> = catalogs[0]
            .harvested
            .iter()
            .filter(|t| t.predicate == RDFS_LABEL)
            .map(|t| t.object.to_string())
            .collect();
        assert_eq!(
            labels,
            BTreeSet::from([
                "\"Etaten - Tjenestekatalog\"@nb".to_string(),
                "\"Etaten nn - Tjenestekatalog\"@nn".to_string(),
                "\"The Agency - Service catalog\"@en".to_string(),
            ])
        );
        assert!(catalogs[0]
            .harvested
            .iter()
            .any(|t| t.predicate == DCT_PUBLISHER));
    }

    #[test]
    fn test_closure_depth_is_a_hard_cap() {
        let mut ttl = String::from(
            "@prefix ex: <http://example.org/> .\n\
             @prefix cpsvno: <https://data.norge.no/vocabulary/cpsvno#> .\n\
             ex:service a cpsvno:Service ; ex:next ex:n1 .\n",
        );
        for i in 1..=12 {
            ttl.push_str(&format!("ex:n{i} ex:next ex:n{} .\n", i + 1));
        }
        let graph = parse_turtle(&ttl).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        let subjects = subjects(&services[0].harvested);

        assert!(subjects.contains("<http://example.org/n10>"));
        assert!(!subjects.contains("<http://example.org/n11>"));
    }

    #[test]
    fn test_cyclic_references_terminate() {
        let ttl = r#"
            @prefix ex: <http://example.org/> .
            @prefix cpsvno: <https://data.norge.no/vocabulary/cpsvno#> .
            ex:service a cpsvno:Service ; ex:rel ex:a .
            ex:a ex:rel ex:b .
            ex:b ex:rel ex:a .
        "#;
        let graph = parse_turtle(ttl).unwrap();
        let services = split_services(&graph, SOURCE_URL);
        assert_eq!(services[0].harvested.len(), 4);
    }
}
