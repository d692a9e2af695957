//! Parsing, serialization and comparison of harvested graphs.

use oxrdf::dataset::CanonicalizationAlgorithm;
use oxrdf::{GraphNameRef, Graph, Triple};
use oxrdfio::{RdfFormat, RdfParseError, RdfParser, RdfSerializer};
use thiserror::Error;

/// Base IRI used to resolve relative IRIs in harvested documents.
pub const BACKUP_BASE_URI: &str = "http://example.com/";

#[derive(Error, Debug)]
pub enum RdfError {
    #[error("no accept header supplied")]
    MissingAcceptHeader,

    #[error("header {0} is not acceptable")]
    UnacceptableAcceptHeader(String),

    #[error("{0}")]
    Parse(#[from] RdfParseError),

    #[error("invalid base IRI: {0}")]
    BaseIri(#[from] oxrdf::IriParseError),

    #[error("failed to serialize graph: {0}")]
    Serialize(#[from] std::io::Error),

    #[error("serialized graph is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Maps a data source's accept header to the serialization it will be parsed as.
///
/// Matching is by substring, in a fixed priority order, so headers listing
/// several media types resolve to the first recognized one. A missing header
/// or a bare `*/*` carries no usable preference.
pub fn format_from_accept_header(accept: Option<&str>) -> Result<RdfFormat, RdfError> {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return Err(RdfError::MissingAcceptHeader);
    };

    let unacceptable = || RdfError::UnacceptableAcceptHeader(accept.to_string());

    if accept.contains("text/turtle") {
        Ok(RdfFormat::Turtle)
    } else if accept.contains("text/n3") {
        Ok(RdfFormat::N3)
    } else if accept.contains("application/trig") {
        Ok(RdfFormat::TriG)
    } else if accept.contains("application/rdf+xml") {
        Ok(RdfFormat::RdfXml)
    } else if accept.contains("application/rdf+json") || accept.contains("application/ld+json") {
        // recognized media types without a bundled codec
        Err(unacceptable())
    } else if accept.contains("application/n-triples") {
        Ok(RdfFormat::NTriples)
    } else if accept.contains("application/n-quads") {
        Ok(RdfFormat::NQuads)
    } else if accept.contains("application/trix") {
        Err(unacceptable())
    } else if accept.contains("*/*") {
        Err(RdfError::MissingAcceptHeader)
    } else {
        Err(unacceptable())
    }
}

/// Parses `body` into a graph. Quads in named graphs are merged into the
/// default graph.
pub fn parse_graph(body: &str, format: RdfFormat) -> Result<Graph, RdfError> {
    let parser = RdfParser::from_format(format).with_base_iri(BACKUP_BASE_URI)?;

    let mut graph = Graph::new();
    for quad in parser.for_reader(body.as_bytes()) {
        let quad = quad?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }

    Ok(graph)
}

pub fn parse_turtle(body: &str) -> Result<Graph, RdfError> {
    parse_graph(body, RdfFormat::Turtle)
}

pub fn serialize_graph(graph: &Graph, format: RdfFormat) -> Result<String, RdfError> {
    let mut serializer = RdfSerializer::from_format(format).for_writer(Vec::new());
    for triple in graph {
        serializer.serialize_quad(triple.in_graph(GraphNameRef::DefaultGraph))?;
    }
    let bytes = serializer.finish()?;

    Ok(String::from_utf8(bytes)?)
}

pub fn to_turtle(graph: &Graph) -> Result<String, RdfError> {
    serialize_graph(graph, RdfFormat::Turtle)
}

/// Structural equality that ignores blank node labels but not IRIs.
pub fn is_isomorphic(left: &Graph, right: &Graph) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut left = left.clone();
    let mut right = right.clone();
    left.canonicalize(CanonicalizationAlgorithm::Unstable);
    right.canonicalize(CanonicalizationAlgorithm::Unstable);

    left == right
}

pub fn union(left: &Graph, right: &Graph) -> Graph {
    let mut merged = left.clone();
    merged.extend(right.iter());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: &str = r#"
        @prefix ex: <http://example.org/> .
        ex:a ex:name "A" ;
             ex:address [ ex:street "Main" ; ex:zip "0150" ] .
    "#;

    const TTL_RELABELED: &str = r#"
        <http://example.org/a> <http://example.org/address> _:other .
        _:other <http://example.org/zip> "0150" .
        _:other <http://example.org/street> "Main" .
        <http://example.org/a> <http://example.org/name> "A" .
    "#;

    #[test]
    fn test_accept_header_negotiation() {
        assert_eq!(
            format_from_accept_header(Some("text/turtle")).unwrap(),
            RdfFormat::Turtle
        );
        assert_eq!(
            format_from_accept_header(Some("application/rdf+xml;q=0.9")).unwrap(),
            RdfFormat::RdfXml
        );
        assert_eq!(
            format_from_accept_header(Some("application/n-triples")).unwrap(),
            RdfFormat::NTriples
        );
        assert!(matches!(
            format_from_accept_header(None),
            Err(RdfError::MissingAcceptHeader)
        ));
        assert!(matches!(
            format_from_accept_header(Some("*/*")),
            Err(RdfError::MissingAcceptHeader)
        ));
        assert!(matches!(
            format_from_accept_header(Some("application/json")),
            Err(RdfError::UnacceptableAcceptHeader(_))
        ));
    }

    #[test]
    fn test_parse_reports_syntax_errors() {
        let result = parse_turtle("<http://example.org/a> <http://example.org/b> .");
        assert!(matches!(result, Err(RdfError::Parse(_))));
    }

    #[test]
    fn test_isomorphism_ignores_blank_node_labels() {
        let left = parse_turtle(TTL).unwrap();
        let right = parse_turtle(TTL_RELABELED).unwrap();
        assert_eq!(left.len(), 4);
        assert!(is_isomorphic(&left, &right));
    }

    #[test]
    fn test_isomorphism_respects_iris() {
        let left = parse_turtle(TTL).unwrap();
        let right = parse_turtle(&TTL_RELABELED.replace("example.org/a>", "example.org/b>")).unwrap();
        assert!(!is_isomorphic(&left, &right));
    }

    #[test]
    fn test_turtle_output_parses_back_to_same_graph() {
        let graph = parse_turtle(TTL).unwrap();
        let turtle = to_turtle(&graph).unwrap();
        assert!(is_isomorphic(&graph, &parse_turtle(&turtle).unwrap()));
    }

    #[test]
    fn test_union_merges_without_duplicates() {
        let graph = parse_turtle(TTL).unwrap();
        let merged = union(&graph, &graph);
        assert_eq!(merged.len(), graph.len());
    }
}
