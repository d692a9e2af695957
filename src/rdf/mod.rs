//! RDF support for the harvester: vocabulary, codecs and blank node
//! normalization. Graphs are plain [`oxrdf::Graph`] values owned by the
//! caller; every operation here returns a new graph instead of mutating a
//! shared one.

pub mod codec;
pub mod skolem;
pub mod vocab;

pub use codec::{
    format_from_accept_header, is_isomorphic, parse_graph, parse_turtle, to_turtle, union,
    RdfError,
};
pub use skolem::{create_id_from_string, skolemize};
pub use vocab::EntityType;
