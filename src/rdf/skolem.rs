//! Deterministic skolemization of blank nodes.
//!
//! Harvested documents carry parser-assigned blank node labels, so two
//! harvests of the same data rarely agree on them. Renaming every blank
//! subject to an IRI derived from its own content makes stored graphs
//! comparable across harvests.
//!
//! Renaming runs bottom-up: a blank subject is renamed only once every blank
//! node it points to that has properties of its own has already been
//! renamed. The canonical text of an outer node therefore contains the
//! resolved IRIs of its inner nodes, and nested structures that differ
//! anywhere below never share an identifier.

use oxrdf::{BlankNode, BlankNodeRef, Graph, NamedNode, Subject, SubjectRef, Term, TermRef, Triple};
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

/// Placeholder written for the renamed subject and for leaf blank objects
/// when building canonical text.
const ANONYMOUS: &str = "[]";

/// Derives a stable, name-based identifier from `id_base`.
pub fn create_id_from_string(id_base: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id_base.as_bytes()).to_string()
}

pub fn skolem_iri(base_uri: &str, id: &str) -> String {
    format!("{base_uri}/.well-known/skolem/{id}")
}

/// Replaces blank subjects in `graph` with IRIs under
/// `{base_uri}/.well-known/skolem/`.
///
/// Blank nodes that never appear as a subject are left untouched, as are
/// blank nodes caught in a reference cycle with each other.
pub fn skolemize(graph: Graph, base_uri: &str) -> Graph {
    let mut graph = graph;

    loop {
        let anonymous = anonymous_subjects(&graph);
        if anonymous.is_empty() {
            return graph;
        }

        let renames: HashMap<BlankNode, NamedNode> = anonymous
            .iter()
            .filter(|node| is_ready(&graph, node.as_ref()))
            .map(|node| {
                let id = create_id_from_string(&canonical_text(&graph, node.as_ref()));
                (node.clone(), NamedNode::new_unchecked(skolem_iri(base_uri, &id)))
            })
            .collect();

        if renames.is_empty() {
            warn!(
                remaining = anonymous.len(),
                base_uri, "Cyclic blank nodes could not be skolemized"
            );
            return graph;
        }

        graph = rename(&graph, &renames);
    }
}

fn anonymous_subjects(graph: &Graph) -> HashSet<BlankNode> {
    graph
        .iter()
        .filter_map(|triple| match triple.subject {
            SubjectRef::BlankNode(node) => Some(node.into_owned()),
            _ => None,
        })
        .collect()
}

fn has_properties(graph: &Graph, node: BlankNodeRef<'_>) -> bool {
    graph.triples_for_subject(node).next().is_some()
}

/// A blank subject is ready once none of its blank objects has properties.
fn is_ready(graph: &Graph, node: BlankNodeRef<'_>) -> bool {
    graph
        .triples_for_subject(node)
        .all(|triple| match triple.object {
            TermRef::BlankNode(object) => !has_properties(graph, object),
            _ => true,
        })
}

/// Whitespace-free, character-sorted text of the node's own triples.
fn canonical_text(graph: &Graph, node: BlankNodeRef<'_>) -> String {
    let statements: String = graph
        .triples_for_subject(node)
        .map(|triple| {
            let object = match triple.object {
                TermRef::BlankNode(_) => ANONYMOUS.to_string(),
                other => other.to_string(),
            };
            format!("{ANONYMOUS} {} {object} .", triple.predicate)
        })
        .collect();

    let mut chars: Vec<char> = statements.chars().filter(|c| !c.is_whitespace()).collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

fn rename(graph: &Graph, renames: &HashMap<BlankNode, NamedNode>) -> Graph {
    let mut renamed = Graph::new();

    for triple in graph.iter() {
        let subject: Subject = match triple.subject {
            SubjectRef::BlankNode(node) => match renames.get(&node.into_owned()) {
                Some(iri) => iri.clone().into(),
                None => node.into_owned().into(),
            },
            other => other.into_owned(),
        };
        let object: Term = match triple.object {
            TermRef::BlankNode(node) => match renames.get(&node.into_owned()) {
                Some(iri) => iri.clone().into(),
                None => node.into_owned().into(),
            },
            other => other.into_owned(),
        };
        renamed.insert(&Triple::new(subject, triple.predicate.into_owned(), object));
    }

    renamed
}
