// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # graframe
//!
//! Incrementally describe a pattern over a typed RDF knowledge graph and
//! compile it to one SPARQL query, resolving loose or abbreviated terms to
//! ontology identifiers along the way.
//!
//! ## Architecture
//!
//! - **Lexicon** (`lexicon`): concepts, surface forms and abbreviations, loaded from JSON
//! - **Concept matcher** (`matcher`): multi-signal fuzzy ranking of concepts for free text
//! - **Query graph** (`graph`): persistent nodes, hop-bounded edges, aliases and a cursor
//! - **Query builder** (`query`): immutable builder operations and the SPARQL compiler
//! - **Sessions** (`session`): per-caller current query, plan files
//! - **Execution** (`exec`): executor seam plus an oxigraph-backed store
//!
//! ## Library usage
//!
//! ```
//! use graframe::query::{DataOptions, Query, RelatedOptions};
//!
//! let q = Query::new()
//!     .find_entity("urn:x#Valve", Some("valve"))
//!     .find_related(
//!         "urn:x#Pump",
//!         RelatedOptions {
//!             alias: Some("pump".into()),
//!             hops: 1,
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap()
//!     .find_data(DataOptions::default())
//!     .unwrap()
//!     .filter_data_nodes("urn:x#hasUnit", "DEG_C", Some("pump_data"))
//!     .unwrap();
//!
//! assert!(q.to_sparql().starts_with("SELECT DISTINCT ?v0 ?v1 ?v2"));
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod lexicon;
pub mod matcher;
pub mod query;
pub mod session;
