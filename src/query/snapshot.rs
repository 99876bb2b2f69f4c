use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::{FilterValue, NodeId, QueryEdge, QueryGraph, QueryNode};

/// Plain, serializable copy of a query graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySnapshot {
    pub nodes: Vec<QueryNode>,
    pub edges: Vec<QueryEdge>,
    pub aliases: BTreeMap<String, NodeId>,
    pub aliases_reverse: BTreeMap<NodeId, String>,
    pub current_pointer: Option<NodeId>,
    pub data_nodes: Vec<DataNodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNodeSnapshot {
    pub id: NodeId,
    /// Active alias, or the node's variable name without `?` when it has none.
    pub alias: String,
    pub filters: BTreeMap<String, FilterValue>,
}

impl QuerySnapshot {
    pub(crate) fn of(graph: &QueryGraph) -> Self {
        Self {
            nodes: graph.nodes().values().cloned().collect(),
            edges: graph.edges().to_vec(),
            aliases: graph.aliases().clone(),
            aliases_reverse: graph.aliases_reverse().clone(),
            current_pointer: graph.current_pointer(),
            data_nodes: graph
                .data_nodes()
                .iter()
                .map(|(id, info)| DataNodeSnapshot {
                    id: *id,
                    alias: graph
                        .alias_of(*id)
                        .map_or_else(|| format!("v{id}"), str::to_string),
                    filters: info.filters.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{DataOptions, Query};

    #[test]
    fn snapshot_serializes_to_json() {
        let q = Query::new()
            .find_entity("urn:x#Valve", Some("valve"))
            .find_data(DataOptions::default())
            .unwrap()
            .filter_data_nodes("urn:x#hasUnit", "DEG_C", None)
            .unwrap();
        let json = serde_json::to_value(q.to_dict()).unwrap();

        assert_eq!(json["current_pointer"], 1);
        assert_eq!(json["aliases"]["valve"], 0);
        assert_eq!(json["aliases_reverse"]["1"], "valve_data");
        assert_eq!(json["nodes"][0]["kind"], "entity");
        assert_eq!(json["edges"][0]["hops"], 1);
        assert_eq!(json["data_nodes"][0]["alias"], "valve_data");
        assert_eq!(json["data_nodes"][0]["filters"]["urn:x#hasUnit"], "DEG_C");
    }
}
