//! Immutable query builder.
//!
//! A [`Query`] wraps a [`QueryGraph`] and the next node id to hand out. Every
//! operation validates its arguments and returns a fresh `Query`; the receiver
//! is never touched, so callers can branch freely:
//!
//! ```
//! use graframe::query::{Query, RelatedOptions};
//!
//! let valve = Query::new().find_entity("urn:x#Valve", Some("valve"));
//! let pump = valve
//!     .find_related("urn:x#Pump", RelatedOptions { hops: 1, ..Default::default() })
//!     .unwrap();
//! assert_eq!(valve.graph().len(), 1);
//! assert_eq!(pump.graph().len(), 2);
//! ```

pub mod compile;
mod snapshot;

pub use compile::{CompileOptions, HAS_EXTERNAL_REFERENCE};
pub use snapshot::{DataNodeSnapshot, QuerySnapshot};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::QueryError;
use crate::exec::{ExecResult, QueryExecutor, Row};
use crate::graph::{DataNodeInfo, FilterValue, NodeId, QueryEdge, QueryGraph, QueryNode};

pub type QueryResult<T> = std::result::Result<T, QueryError>;

pub const DEFAULT_HOPS: u32 = 3;

/// Arguments of [`Query::find_related`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedOptions {
    pub alias: Option<String>,
    /// Source alias; the pointer when `None`.
    pub from: Option<String>,
    pub hops: u32,
    pub predicates: Option<Vec<String>>,
    /// Chain `predicates` up to `hops` steps instead of a single step.
    pub multi_hop_predicates: bool,
}

impl Default for RelatedOptions {
    fn default() -> Self {
        Self {
            alias: None,
            from: None,
            hops: DEFAULT_HOPS,
            predicates: None,
            multi_hop_predicates: false,
        }
    }
}

/// Arguments of [`Query::relate_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelateOptions {
    /// Source alias in this query; the pointer when `None`.
    pub from: Option<String>,
    /// Target alias in the other query; its pointer when `None`.
    pub to: Option<String>,
    pub hops: u32,
    pub predicates: Option<Vec<String>>,
}

impl Default for RelateOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            hops: DEFAULT_HOPS,
            predicates: None,
        }
    }
}

/// Arguments of [`Query::find_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataOptions {
    /// Source alias, `*`/`all` for every node, or the pointer when `None`.
    pub from: Option<String>,
    /// Predicate linking source and data node. Any single hop when `None`.
    pub path: Option<String>,
    pub class: Option<String>,
    pub hops: u32,
    pub filters: BTreeMap<String, FilterValue>,
    pub alias: Option<String>,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            from: None,
            path: None,
            class: None,
            hops: DEFAULT_HOPS,
            filters: BTreeMap::new(),
            alias: None,
        }
    }
}

/// Arguments of [`Query::find_all_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct AllDataOptions {
    pub class: Option<String>,
    pub hops: u32,
    pub filters: BTreeMap<String, FilterValue>,
    pub alias: Option<String>,
}

impl Default for AllDataOptions {
    fn default() -> Self {
        Self {
            class: None,
            hops: DEFAULT_HOPS,
            filters: BTreeMap::new(),
            alias: None,
        }
    }
}

fn is_all(selector: Option<&str>) -> bool {
    selector.is_some_and(|s| {
        let s = s.trim();
        s == "*" || s.eq_ignore_ascii_case("all")
    })
}

fn check_hops(hops: u32) -> QueryResult<()> {
    if hops == 0 {
        return Err(QueryError::InvalidHops { hops });
    }
    Ok(())
}

/// Resolve `alias` (or the pointer) to a source node for `operation`.
fn resolve_source(
    graph: &QueryGraph,
    alias: Option<&str>,
    operation: &'static str,
) -> QueryResult<NodeId> {
    graph.resolve_alias(alias).ok_or_else(|| match alias {
        Some(alias) => QueryError::UnknownAlias {
            operation,
            alias: alias.to_string(),
        },
        None => QueryError::NoSource { operation },
    })
}

/// Immutable query builder value.
///
/// The compiled query text is memoized per value; every operation starts a new
/// value with an empty cache.
#[derive(Debug, Clone, Default)]
pub struct Query {
    graph: QueryGraph,
    next_id: u64,
    compiled: OnceLock<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_parts(graph: QueryGraph, next_id: u64) -> Self {
        Self {
            graph,
            next_id,
            compiled: OnceLock::new(),
        }
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// Id the next created node will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Add a typed entity and point at it.
    pub fn find_entity(&self, class: impl Into<String>, alias: Option<&str>) -> Query {
        let id = NodeId::new(self.next_id);
        let graph = self
            .graph
            .with_node(QueryNode::entity(id, class, alias.map(str::to_string)));
        tracing::debug!(op = "find_entity", node = %id, "added entity");
        Self::from_parts(graph, self.next_id + 1)
    }

    /// Add an entity related to the source node and point at it.
    ///
    /// Edge shape: with `predicates` and `multi_hop_predicates`, those
    /// predicates chained up to `hops` steps; with `predicates` alone, exactly
    /// one step over them; without `predicates`, any relation up to `hops`.
    pub fn find_related(
        &self,
        class: impl Into<String>,
        options: RelatedOptions,
    ) -> QueryResult<Query> {
        check_hops(options.hops)?;
        let source = resolve_source(&self.graph, options.from.as_deref(), "find_related")?;

        let id = NodeId::new(self.next_id);
        let has_predicates = options.predicates.as_ref().is_some_and(|p| !p.is_empty());
        let hops = if has_predicates && !options.multi_hop_predicates {
            1
        } else {
            options.hops
        };
        let edge = QueryEdge::new(source, id, hops)
            .with_predicates(options.predicates.filter(|p| !p.is_empty()));

        let graph = self
            .graph
            .with_node(QueryNode::entity(id, class, options.alias))
            .with_edge(edge, Some(id));
        tracing::debug!(
            op = "find_related",
            source = %source,
            node = %id,
            hops,
            "added related entity"
        );
        Ok(Self::from_parts(graph, self.next_id + 1))
    }

    /// Merge `other` into this query and relate this query's source node to
    /// `other`'s target node.
    ///
    /// Ids of `other` are shifted past this graph's largest id
    /// (`max + 1 + original`), so the merged graph keeps both sub-patterns as
    /// independent constraints. The shifted target becomes the pointer.
    pub fn relate_to(&self, other: &Query, options: RelateOptions) -> QueryResult<Query> {
        check_hops(options.hops)?;
        let source = resolve_source(&self.graph, options.from.as_deref(), "relate_to")?;
        let target = other
            .graph
            .resolve_alias(options.to.as_deref())
            .ok_or_else(|| match options.to.as_deref() {
                Some(alias) => QueryError::UnknownAlias {
                    operation: "relate_to",
                    alias: alias.to_string(),
                },
                None => QueryError::NoTarget {
                    operation: "relate_to",
                },
            })?;

        let offset = self.graph.max_id().map_or(0, |max| max.get() + 1);
        let target = target.offset(offset);
        let edge = QueryEdge::new(source, target, options.hops)
            .with_predicates(options.predicates.filter(|p| !p.is_empty()));
        let graph = self.graph.absorb(&other.graph, offset).with_edge(edge, Some(target));

        let next_id = self
            .next_id
            .max(other.next_id)
            .max(graph.max_id().map_or(0, |max| max.get() + 1));
        tracing::debug!(
            op = "relate_to",
            source = %source,
            target = %target,
            offset,
            hops = options.hops,
            "merged queries"
        );
        Ok(Self::from_parts(graph, next_id))
    }

    /// Attach a data node to one source, or to every node with `from = "*"`.
    ///
    /// Each data node hangs one hop off its source, over `path` when given.
    /// Without an explicit alias each is named `<source alias>_data`; with one
    /// and several sources, the i-th after the first gets `<alias>_<i>`.
    pub fn find_data(&self, options: DataOptions) -> QueryResult<Query> {
        check_hops(options.hops)?;
        let sources: Vec<NodeId> = if is_all(options.from.as_deref()) {
            if self.graph.is_empty() {
                return Err(QueryError::EmptyGraph {
                    operation: "find_data",
                });
            }
            self.graph.nodes().keys().copied().collect()
        } else {
            vec![resolve_source(&self.graph, options.from.as_deref(), "find_data")?]
        };

        let mut graph = self.graph.clone();
        let mut next_id = self.next_id;
        for (i, &source) in sources.iter().enumerate() {
            let alias = match &options.alias {
                None => {
                    let base = self
                        .graph
                        .alias_of(source)
                        .map_or_else(|| source.to_string(), str::to_string);
                    format!("{base}_data")
                }
                Some(alias) if i > 0 => format!("{alias}_{i}"),
                Some(alias) => alias.clone(),
            };
            let id = NodeId::new(next_id);
            next_id += 1;
            graph = attach_data_node(&graph, id, Some(source), Some(alias), &options);
        }

        tracing::debug!(
            op = "find_data",
            sources = sources.len(),
            path = options.path.as_deref().unwrap_or("-"),
            "attached data nodes"
        );
        Ok(Self::from_parts(graph, next_id))
    }

    /// Attach data nodes to every node, or start with a lone data node when
    /// the graph is empty.
    pub fn find_all_data(&self, options: AllDataOptions) -> QueryResult<Query> {
        check_hops(options.hops)?;
        let data = DataOptions {
            from: Some("*".to_string()),
            path: None,
            class: options.class,
            hops: options.hops,
            filters: options.filters,
            alias: options.alias,
        };
        if !self.graph.is_empty() {
            return self.find_data(data);
        }

        let id = NodeId::new(self.next_id);
        let graph = attach_data_node(&self.graph, id, None, data.alias.clone(), &data);
        tracing::debug!(op = "find_all_data", node = %id, "added standalone data node");
        Ok(Self::from_parts(graph, self.next_id + 1))
    }

    /// Set `predicate = value` on the selected data nodes, keeping their other
    /// filters.
    ///
    /// Selection: `*`/`all` picks every data node; no `from` picks the pointer
    /// if it is a data node, else every data node; a data node alias picks that
    /// node; an entity alias picks the data nodes one hop off it.
    pub fn filter_data_nodes(
        &self,
        predicate: impl Into<String>,
        value: impl Into<FilterValue>,
        from: Option<&str>,
    ) -> QueryResult<Query> {
        let targets = self.select_data_nodes(from)?;
        let predicate = predicate.into();
        let value = value.into();

        let mut graph = self.graph.clone();
        for id in &targets {
            let mut info = graph
                .data_nodes()
                .get(id)
                .cloned()
                .unwrap_or_else(|| DataNodeInfo::new(*id));
            info.filters.insert(predicate.clone(), value.clone());
            graph = graph.with_data_node(info);
        }
        tracing::debug!(
            op = "filter_data_nodes",
            predicate = %predicate,
            targets = targets.len(),
            "set filter"
        );
        Ok(Self::from_parts(graph, self.next_id))
    }

    fn select_data_nodes(&self, from: Option<&str>) -> QueryResult<Vec<NodeId>> {
        let g = &self.graph;
        if g.data_nodes().is_empty() {
            return Err(QueryError::NoDataNodes);
        }
        let all = || g.data_nodes().keys().copied().collect::<Vec<_>>();

        if is_all(from) {
            return Ok(all());
        }
        let Some(alias) = from else {
            return Ok(match g.current_pointer() {
                Some(pointer) if g.is_data_node(pointer) => vec![pointer],
                _ => all(),
            });
        };

        let id = g.resolve_alias(Some(alias)).ok_or_else(|| QueryError::UnknownAlias {
            operation: "filter_data_nodes",
            alias: alias.to_string(),
        })?;
        if g.is_data_node(id) {
            return Ok(vec![id]);
        }

        let mut attached: Vec<NodeId> = g
            .edges()
            .iter()
            .filter(|e| e.source == id && g.is_data_node(e.target))
            .map(|e| e.target)
            .collect();
        attached.sort();
        attached.dedup();
        if attached.is_empty() {
            return Err(QueryError::NoFilterTargets);
        }
        Ok(attached)
    }

    /// Structural snapshot for inspection.
    pub fn to_dict(&self) -> QuerySnapshot {
        QuerySnapshot::of(&self.graph)
    }

    /// Compiled query text with the default options, computed once per value.
    pub fn to_sparql(&self) -> &str {
        self.compiled
            .get_or_init(|| compile::compile(&self.graph, &CompileOptions::default()))
    }

    /// Compile with explicit options (not memoized).
    pub fn to_sparql_with(&self, options: &CompileOptions) -> String {
        compile::compile(&self.graph, options)
    }

    /// Compile and run against `executor`.
    pub fn execute<E: QueryExecutor + ?Sized>(&self, executor: &E) -> ExecResult<Vec<Row>> {
        executor.select(self.to_sparql())
    }
}

/// Add a data leaf (and its edge from `source`, if any) plus its filter record.
fn attach_data_node(
    graph: &QueryGraph,
    id: NodeId,
    source: Option<NodeId>,
    alias: Option<String>,
    options: &DataOptions,
) -> QueryGraph {
    let node = QueryNode::data_leaf(id, options.class.clone(), alias, options.path.clone());
    let mut graph = graph.with_node(node);
    if let Some(source) = source {
        let predicates = options.path.clone().map(|p| vec![p]);
        let edge = QueryEdge::new(source, id, 1).with_predicates(predicates);
        graph = graph.with_edge(edge, Some(id));
    }
    graph.with_data_node(DataNodeInfo::new(id).with_filters(options.filters.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw)
    }

    fn valve_pump() -> Query {
        Query::new().find_entity("urn:x#Valve", Some("valve")).find_related(
            "urn:x#Pump",
            RelatedOptions {
                alias: Some("pump".into()),
                from: Some("valve".into()),
                hops: 1,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn find_entity_allocates_sequential_ids() {
        let q = Query::new().find_entity("urn:x#A", None).find_entity("urn:x#B", None);
        assert_eq!(q.graph().max_id(), Some(id(1)));
        assert_eq!(q.next_id(), 2);
        assert_eq!(q.graph().current_pointer(), Some(id(1)));
    }

    #[test]
    fn find_related_without_source_fails() {
        let err = Query::new()
            .find_related("urn:x#Pump", RelatedOptions::default())
            .unwrap_err();
        assert_eq!(err, QueryError::NoSource { operation: "find_related" });

        let err = valve_pump()
            .find_related(
                "urn:x#Pump",
                RelatedOptions {
                    from: Some("tank".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownAlias { alias, .. } if alias == "tank"));
    }

    #[test]
    fn find_related_edge_shapes() {
        let base = Query::new().find_entity("urn:x#Valve", Some("valve"));
        let preds = Some(vec!["urn:x#feeds".to_string()]);

        let single = base
            .find_related(
                "urn:x#Pump",
                RelatedOptions {
                    hops: 4,
                    predicates: preds.clone(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(single.graph().edges()[0].hops, 1);

        let chained = base
            .find_related(
                "urn:x#Pump",
                RelatedOptions {
                    hops: 4,
                    predicates: preds,
                    multi_hop_predicates: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(chained.graph().edges()[0].hops, 4);

        let open = base
            .find_related("urn:x#Pump", RelatedOptions { hops: 2, ..Default::default() })
            .unwrap();
        assert_eq!(open.graph().edges()[0].hops, 2);
        assert_eq!(open.graph().edges()[0].predicates, None);
    }

    #[test]
    fn zero_hops_are_rejected() {
        let q = valve_pump();
        let err = q
            .find_related("urn:x#Tank", RelatedOptions { hops: 0, ..Default::default() })
            .unwrap_err();
        assert_eq!(err, QueryError::InvalidHops { hops: 0 });
        assert!(q.relate_to(&q, RelateOptions { hops: 0, ..Default::default() }).is_err());
        assert!(q.find_data(DataOptions { hops: 0, ..Default::default() }).is_err());
    }

    #[test]
    fn failed_operations_leave_the_query_unchanged() {
        let q = valve_pump();
        let before = q.to_dict();
        let _ = q.find_related(
            "urn:x#Tank",
            RelatedOptions {
                from: Some("nope".into()),
                ..Default::default()
            },
        );
        let _ = q.filter_data_nodes("urn:x#hasUnit", "DEG_C", None);
        assert_eq!(q.to_dict(), before);
    }

    #[test]
    fn relate_to_shifts_the_other_id_space() {
        let valve = Query::new().find_entity("urn:x#Valve", Some("valve"));
        let pump = Query::new().find_entity("urn:x#Pump", Some("pump"));
        let merged = valve.relate_to(&pump, RelateOptions::default()).unwrap();

        let g = merged.graph();
        assert_eq!(g.len(), 2);
        assert_eq!(g.resolve_alias(Some("valve")), Some(id(0)));
        assert_eq!(g.resolve_alias(Some("pump")), Some(id(1)));
        assert_eq!(g.current_pointer(), Some(id(1)));
        assert_eq!(g.edges().last().map(|e| (e.source, e.target, e.hops)), Some((id(0), id(1), 3)));
        assert_eq!(merged.next_id(), 2);

        // New nodes after the merge never reuse a shifted id.
        let more = merged.find_entity("urn:x#Tank", None);
        assert_eq!(more.graph().len(), 3);
    }

    #[test]
    fn relate_to_keeps_auto_aliases_distinct() {
        let a = Query::new().find_entity("urn:x#A", None);
        let b = Query::new().find_entity("urn:x#B", None);
        let merged = a.relate_to(&b, RelateOptions::default()).unwrap();
        assert_eq!(merged.graph().resolve_alias(Some("0")), Some(id(0)));
        assert_eq!(merged.graph().resolve_alias(Some("1")), Some(id(1)));
    }

    #[test]
    fn relate_to_requires_a_target() {
        let err = valve_pump().relate_to(&Query::new(), RelateOptions::default()).unwrap_err();
        assert_eq!(err, QueryError::NoTarget { operation: "relate_to" });
    }

    #[test]
    fn find_data_names_nodes_after_their_source() {
        let q = valve_pump()
            .find_data(DataOptions { from: Some("valve".into()), ..Default::default() })
            .unwrap();
        let data = q.graph().resolve_alias(Some("valve_data")).unwrap();
        assert_eq!(data, id(2));
        assert!(q.graph().is_data_node(data));
        let edge = q.graph().edges().last().unwrap();
        assert_eq!((edge.source, edge.target, edge.hops), (id(0), id(2), 1));
    }

    #[test]
    fn find_data_over_all_nodes_suffixes_explicit_aliases() {
        let q = valve_pump()
            .find_data(DataOptions {
                from: Some("ALL".into()),
                path: Some("urn:x#hasPoint".into()),
                alias: Some("point".into()),
                ..Default::default()
            })
            .unwrap();
        let g = q.graph();
        assert_eq!(g.resolve_alias(Some("point")), Some(id(2)));
        assert_eq!(g.resolve_alias(Some("point_1")), Some(id(3)));
        assert_eq!(g.data_nodes().len(), 2);
        assert_eq!(q.next_id(), 4);
        for edge in &g.edges()[1..] {
            assert_eq!(edge.predicates, Some(vec!["urn:x#hasPoint".to_string()]));
        }
        assert_eq!(
            g.node(id(3)).map(|n| n.kind.clone()),
            Some(NodeKind::DataLeaf { sourced_via: Some("urn:x#hasPoint".into()) })
        );
    }

    #[test]
    fn find_data_star_on_empty_graph_fails() {
        let err = Query::new()
            .find_data(DataOptions { from: Some("*".into()), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, QueryError::EmptyGraph { operation: "find_data" });
    }

    #[test]
    fn find_all_data_on_empty_graph_creates_a_lone_node() {
        let q = Query::new().find_all_data(AllDataOptions::default()).unwrap();
        assert_eq!(q.graph().len(), 1);
        assert!(q.graph().edges().is_empty());
        assert!(q.graph().is_data_node(id(0)));
        assert_eq!(q.graph().current_pointer(), Some(id(0)));
    }

    #[test]
    fn find_all_data_expands_every_node() {
        let q = valve_pump().find_all_data(AllDataOptions::default()).unwrap();
        assert!(q.graph().resolve_alias(Some("valve_data")).is_some());
        assert!(q.graph().resolve_alias(Some("pump_data")).is_some());
    }

    #[test]
    fn filters_accumulate_per_predicate() {
        let q = valve_pump()
            .find_data(DataOptions { from: Some("valve".into()), ..Default::default() })
            .unwrap()
            .filter_data_nodes("urn:x#hasUnit", "DEG_C", Some("valve_data"))
            .unwrap()
            .filter_data_nodes("urn:x#hasMedium", "water", Some("valve_data"))
            .unwrap()
            .filter_data_nodes("urn:x#hasUnit", "DEG_F", Some("valve_data"))
            .unwrap();
        let info = &q.graph().data_nodes()[&id(2)];
        assert_eq!(info.filters.len(), 2);
        assert_eq!(info.filters["urn:x#hasUnit"], FilterValue::from("DEG_F"));
        assert_eq!(info.filters["urn:x#hasMedium"], FilterValue::from("water"));
    }

    #[test]
    fn filter_target_selection() {
        let q = valve_pump().find_all_data(AllDataOptions::default()).unwrap();

        let no_data = valve_pump().filter_data_nodes("urn:x#p", 1i64, None).unwrap_err();
        assert_eq!(no_data, QueryError::NoDataNodes);

        // pointer is the last data node
        let one = q.filter_data_nodes("urn:x#p", true, None).unwrap();
        assert_eq!(one.graph().data_nodes().values().filter(|d| !d.filters.is_empty()).count(), 1);

        let every = q.filter_data_nodes("urn:x#p", true, Some("*")).unwrap();
        assert!(every.graph().data_nodes().values().all(|d| !d.filters.is_empty()));

        let via_entity = q.filter_data_nodes("urn:x#p", true, Some("pump")).unwrap();
        let pump_data = q.graph().resolve_alias(Some("pump_data")).unwrap();
        assert!(!via_entity.graph().data_nodes()[&pump_data].filters.is_empty());
    }

    #[test]
    fn filtering_an_entity_without_data_fails() {
        let q = valve_pump()
            .find_data(DataOptions { from: Some("valve".into()), ..Default::default() })
            .unwrap();
        assert_eq!(
            q.filter_data_nodes("urn:x#p", "v", Some("pump")).unwrap_err(),
            QueryError::NoFilterTargets
        );
    }

    #[test]
    fn compiled_text_is_memoized_per_value() {
        let q = valve_pump();
        let first = q.to_sparql() as *const str;
        assert_eq!(q.to_sparql() as *const str, first);
        let q2 = q.find_entity("urn:x#Tank", None);
        assert_ne!(q.to_sparql(), q2.to_sparql());
    }
}
