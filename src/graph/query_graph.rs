//! Persistent query graph value.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DataNodeInfo, NodeId, QueryEdge, QueryNode};

/// Immutable graph of query nodes and edges with an alias table and a cursor.
///
/// Collections sit behind `Arc`, so cloning a graph is cheap and an edit only
/// copies the collection it touches (`Arc::make_mut` on a fresh clone). A
/// graph handed out earlier therefore never observes later edits.
///
/// `aliases` and `aliases_reverse` are kept as exact inverses: re-aliasing a
/// node retires its old name, and taking a name from another node leaves that
/// node without an active alias.
#[derive(Debug, Clone, Default)]
pub struct QueryGraph {
    nodes: Arc<BTreeMap<NodeId, QueryNode>>,
    edges: Arc<Vec<QueryEdge>>,
    aliases: Arc<BTreeMap<String, NodeId>>,
    aliases_reverse: Arc<BTreeMap<NodeId, String>>,
    current_pointer: Option<NodeId>,
    data_nodes: Arc<BTreeMap<NodeId, DataNodeInfo>>,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node, register its alias (the stringified id when
    /// none is given) and move the pointer to it.
    pub fn with_node(&self, node: QueryNode) -> Self {
        let mut next = self.clone();
        let id = node.id;
        let name = node.alias.clone().unwrap_or_else(|| id.to_string());
        next.bind_alias(name, id);
        Arc::make_mut(&mut next.nodes).insert(id, node);
        next.current_pointer = Some(id);
        next
    }

    /// Append an edge, optionally moving the pointer.
    pub fn with_edge(&self, edge: QueryEdge, new_pointer: Option<NodeId>) -> Self {
        debug_assert!(self.nodes.contains_key(&edge.source), "edge source must exist");
        debug_assert!(self.nodes.contains_key(&edge.target), "edge target must exist");
        debug_assert!(edge.hops >= 1, "hops must be at least 1");
        let mut next = self.clone();
        Arc::make_mut(&mut next.edges).push(edge);
        if new_pointer.is_some() {
            next.current_pointer = new_pointer;
        }
        next
    }

    /// Register or overwrite the filter record of a data node.
    pub fn with_data_node(&self, info: DataNodeInfo) -> Self {
        debug_assert!(
            self.nodes
                .get(&info.node_id)
                .is_some_and(QueryNode::is_data_node),
            "filter records belong to data leaves"
        );
        let mut next = self.clone();
        Arc::make_mut(&mut next.data_nodes).insert(info.node_id, info);
        next
    }

    /// Copy every node, edge, alias and data record of `other` into this graph,
    /// shifting its ids by `offset`. Explicit aliases of `other` win on
    /// collision. The pointer stays where it was.
    pub fn absorb(&self, other: &QueryGraph, offset: u64) -> Self {
        let mut next = self.clone();
        {
            let nodes = Arc::make_mut(&mut next.nodes);
            for (id, node) in other.nodes.iter() {
                let mut node = node.clone();
                node.id = id.offset(offset);
                nodes.insert(node.id, node);
            }
        }
        Arc::make_mut(&mut next.edges).extend(other.edges.iter().map(|e| QueryEdge {
            source: e.source.offset(offset),
            target: e.target.offset(offset),
            hops: e.hops,
            predicates: e.predicates.clone(),
        }));
        for (name, id) in other.aliases.iter() {
            let shifted = id.offset(offset);
            // Auto-aliases follow their node into the new id space.
            let name = if *name == id.to_string() {
                shifted.to_string()
            } else {
                name.clone()
            };
            next.bind_alias(name, shifted);
        }
        {
            let data = Arc::make_mut(&mut next.data_nodes);
            for (id, info) in other.data_nodes.iter() {
                let id = id.offset(offset);
                data.insert(id, DataNodeInfo {
                    node_id: id,
                    filters: info.filters.clone(),
                });
            }
        }
        next
    }

    /// The pointer when `alias` is `None`, otherwise the node bound to `alias`.
    pub fn resolve_alias(&self, alias: Option<&str>) -> Option<NodeId> {
        match alias {
            None => self.current_pointer,
            Some(name) => self.aliases.get(name).copied(),
        }
    }

    fn bind_alias(&mut self, name: String, id: NodeId) {
        if self.aliases.get(&name) == Some(&id) {
            return;
        }
        let aliases = Arc::make_mut(&mut self.aliases);
        let reverse = Arc::make_mut(&mut self.aliases_reverse);

        if let Some(previous) = aliases.insert(name.clone(), id) {
            tracing::warn!(
                alias = %name,
                from = %previous,
                to = %id,
                "alias rebound to another node"
            );
            reverse.remove(&previous);
        }
        if let Some(old_name) = reverse.insert(id, name) {
            aliases.remove(&old_name);
        }
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, QueryNode> {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(&id)
    }

    pub fn edges(&self) -> &[QueryEdge] {
        &self.edges
    }

    pub fn aliases(&self) -> &BTreeMap<String, NodeId> {
        &self.aliases
    }

    pub fn aliases_reverse(&self) -> &BTreeMap<NodeId, String> {
        &self.aliases_reverse
    }

    /// Active alias of a node.
    pub fn alias_of(&self, id: NodeId) -> Option<&str> {
        self.aliases_reverse.get(&id).map(String::as_str)
    }

    pub fn current_pointer(&self) -> Option<NodeId> {
        self.current_pointer
    }

    pub fn data_nodes(&self) -> &BTreeMap<NodeId, DataNodeInfo> {
        &self.data_nodes
    }

    pub fn is_data_node(&self, id: NodeId) -> bool {
        self.data_nodes.contains_key(&id)
    }

    /// Largest node id, if any node exists.
    pub fn max_id(&self) -> Option<NodeId> {
        self.nodes.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw)
    }

    fn two_nodes() -> QueryGraph {
        QueryGraph::new()
            .with_node(QueryNode::entity(id(0), "urn:Valve", Some("valve".into())))
            .with_node(QueryNode::entity(id(1), "urn:Pump", None))
    }

    #[test]
    fn with_node_moves_pointer_and_auto_aliases() {
        let g = two_nodes();
        assert_eq!(g.current_pointer(), Some(id(1)));
        assert_eq!(g.resolve_alias(Some("valve")), Some(id(0)));
        assert_eq!(g.resolve_alias(Some("1")), Some(id(1)));
        assert_eq!(g.resolve_alias(None), Some(id(1)));
        assert_eq!(g.resolve_alias(Some("nope")), None);
    }

    #[test]
    fn edits_leave_earlier_values_untouched() {
        let g1 = two_nodes();
        let g2 = g1
            .with_edge(QueryEdge::new(id(0), id(1), 2), Some(id(0)))
            .with_node(QueryNode::entity(id(2), "urn:Tank", Some("tank".into())));

        assert!(g1.edges().is_empty());
        assert_eq!(g1.len(), 2);
        assert_eq!(g1.current_pointer(), Some(id(1)));
        assert_eq!(g2.edges().len(), 1);
        assert_eq!(g2.len(), 3);
    }

    #[test]
    fn with_edge_keeps_pointer_without_override() {
        let g = two_nodes().with_edge(QueryEdge::new(id(0), id(1), 1), None);
        assert_eq!(g.current_pointer(), Some(id(1)));
    }

    #[test]
    fn alias_collision_is_last_write_wins() {
        let g = two_nodes().with_node(QueryNode::entity(id(2), "urn:Valve", Some("valve".into())));
        assert_eq!(g.resolve_alias(Some("valve")), Some(id(2)));
        assert_eq!(g.alias_of(id(2)), Some("valve"));
        assert_eq!(g.alias_of(id(0)), None);
        for (name, nid) in g.aliases() {
            assert_eq!(g.alias_of(*nid), Some(name.as_str()));
        }
    }

    #[test]
    fn re_aliasing_a_node_retires_its_old_name() {
        let g = two_nodes().with_node(QueryNode::entity(id(0), "urn:Valve", Some("v".into())));
        assert_eq!(g.resolve_alias(Some("valve")), None);
        assert_eq!(g.resolve_alias(Some("v")), Some(id(0)));
        assert_eq!(g.aliases().len(), g.aliases_reverse().len());
    }

    #[test]
    fn absorb_shifts_ids_edges_and_data_records() {
        let leaf = QueryNode::data_leaf(id(1), None, Some("pump_data".into()), None);
        let other = QueryGraph::new()
            .with_node(QueryNode::entity(id(0), "urn:Pump", Some("pump".into())))
            .with_node(leaf)
            .with_edge(QueryEdge::new(id(0), id(1), 1), None)
            .with_data_node(DataNodeInfo::new(id(1)));

        let merged = two_nodes().absorb(&other, 2);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.resolve_alias(Some("pump")), Some(id(2)));
        assert_eq!(merged.edges()[0].source, id(2));
        assert_eq!(merged.edges()[0].target, id(3));
        assert!(merged.is_data_node(id(3)));
        assert_eq!(merged.node(id(3)).map(|n| n.id), Some(id(3)));
        assert_eq!(merged.current_pointer(), Some(id(1)));
        assert_eq!(merged.max_id(), Some(id(3)));
    }
}
