//! Query graph: the typed pattern a [`Query`](crate::query::Query) builds up.
//!
//! Nodes are either typed entities or data leaves (observable points that must
//! carry an external reference), edges are hop-bounded and optionally
//! restricted to a predicate set. The aggregate [`QueryGraph`] is a persistent
//! value: every edit returns a new graph and never disturbs earlier ones.

mod query_graph;

pub use query_graph::QueryGraph;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a node, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The pattern variable bound to this node in compiled queries.
    pub fn var(self) -> String {
        format!("?v{}", self.0)
    }

    /// Shift into another id space (used when merging graphs).
    pub const fn offset(self, by: u64) -> Self {
        Self(self.0 + by)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A typed thing in the building graph (equipment, location, ...).
    #[default]
    Entity,
    /// An observable point. `sourced_via` is the predicate that reached it,
    /// when one was given.
    DataLeaf { sourced_via: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryNode {
    pub id: NodeId,
    /// Ontology class IRI; `None` leaves the node untyped.
    pub class: Option<String>,
    pub alias: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl QueryNode {
    pub fn entity(id: NodeId, class: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            id,
            class: Some(class.into()),
            alias,
            kind: NodeKind::Entity,
        }
    }

    pub fn data_leaf(
        id: NodeId,
        class: Option<String>,
        alias: Option<String>,
        sourced_via: Option<String>,
    ) -> Self {
        Self {
            id,
            class,
            alias,
            kind: NodeKind::DataLeaf { sourced_via },
        }
    }

    pub fn is_data_node(&self) -> bool {
        matches!(self.kind, NodeKind::DataLeaf { .. })
    }
}

/// A directed, hop-bounded relation between two nodes.
///
/// `predicates: None` admits any relation. Parallel edges between the same
/// pair are kept as separate constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEdge {
    pub source: NodeId,
    pub target: NodeId,
    /// Maximum path length, at least 1.
    pub hops: u32,
    pub predicates: Option<Vec<String>>,
}

impl QueryEdge {
    pub fn new(source: NodeId, target: NodeId, hops: u32) -> Self {
        Self {
            source,
            target,
            hops,
            predicates: None,
        }
    }

    pub fn with_predicates(mut self, predicates: Option<Vec<String>>) -> Self {
        self.predicates = predicates;
        self
    }

    /// Allowed predicates with blanks and repeats removed, first occurrence first.
    /// Empty means unconstrained.
    pub fn distinct_predicates(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for p in self.predicates.iter().flatten() {
            let p = p.as_str();
            if !p.is_empty() && !seen.contains(&p) {
                seen.push(p);
            }
        }
        seen
    }
}

/// Object of a data-node filter triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    /// Text values that look like an IRI are emitted as IRIs, everything else
    /// as a quoted literal.
    pub fn is_iri(&self) -> bool {
        match self {
            Self::Text(s) => s.contains("://") || s.starts_with("urn:"),
            _ => false,
        }
    }
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part of whole floats ("1.0", not "1").
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for FilterValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

/// Filters attached to one data node, keyed by predicate IRI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNodeInfo {
    pub node_id: NodeId,
    pub filters: BTreeMap<String, FilterValue>,
}

impl DataNodeInfo {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            filters: BTreeMap::new(),
        }
    }

    pub fn with_filters(mut self, filters: BTreeMap<String, FilterValue>) -> Self {
        self.filters = filters;
        self
    }
}
