//! Lowers a [`QueryGraph`] into a SPARQL `SELECT DISTINCT` query.
//!
//! Every node `n` is bound to `?v<n>`. Clauses are emitted in a fixed order:
//!
//! 1. `?v a <class> .` for each typed node, by id
//! 2. one pattern per edge, in insertion order
//! 3. the external-reference triple and filter triples of each data node
//!
//! Edge patterns:
//!
//! - **Constrained, 1 hop**: `?s (<p>|<q>) ?t .`
//! - **Constrained, n hops**: every predicate repeated 1..=n times, all
//!   sequences alternated in one path, e.g. `(<p>|<p>/<p>|<q>|<q>/<q>)`. A
//!   sequence never mixes predicates, so `p` then `q` is not matched.
//! - **Unconstrained**: an explicit chain of k triples for each k in 1..=n with
//!   predicate and intermediate variables private to the edge and length, the
//!   chains joined by `UNION`.

use crate::graph::{FilterValue, QueryEdge, QueryGraph};

/// Relation every data point carries to its time-series binding.
pub const HAS_EXTERNAL_REFERENCE: &str = "https://brickschema.org/schema/Brick/ref#hasExternalReference";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Predicate required on every data node.
    pub external_reference: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            external_reference: HAS_EXTERNAL_REFERENCE.to_string(),
        }
    }
}

/// Compile `graph` into query text. Pure function of the graph.
pub fn compile(graph: &QueryGraph, options: &CompileOptions) -> String {
    if graph.is_empty() {
        return "SELECT DISTINCT * WHERE { }".to_string();
    }

    let mut clauses: Vec<String> = Vec::new();

    for (id, node) in graph.nodes() {
        if let Some(class) = node.class.as_deref().filter(|c| !c.is_empty()) {
            clauses.push(format!("{} a <{class}> .", id.var()));
        }
    }

    for (index, edge) in graph.edges().iter().enumerate() {
        clauses.push(edge_pattern(&edge.source.var(), &edge.target.var(), edge, index));
    }

    for (id, info) in graph.data_nodes() {
        let var = id.var();
        clauses.push(format!("{var} <{}> ?ext{id} .", options.external_reference));
        for (predicate, value) in &info.filters {
            clauses.push(format!("{var} <{predicate}> {} .", object_term(value)));
        }
    }

    let select = graph
        .nodes()
        .keys()
        .map(|id| id.var())
        .collect::<Vec<_>>()
        .join(" ");
    format!("SELECT DISTINCT {select}\nWHERE {{\n  {}\n}}", clauses.join("\n  "))
}

fn edge_pattern(source: &str, target: &str, edge: &QueryEdge, index: usize) -> String {
    let hops = edge.hops.max(1);
    let predicates = edge.distinct_predicates();

    if predicates.is_empty() {
        return unconstrained_chains(source, target, hops, index);
    }

    let alternatives: Vec<String> = if hops == 1 {
        predicates.iter().map(|p| format!("<{p}>")).collect()
    } else {
        predicates
            .iter()
            .flat_map(|p| {
                (1..=hops).map(move |k| vec![format!("<{p}>"); k as usize].join("/"))
            })
            .collect()
    };
    format!("{source} ({}) {target} .", alternatives.join("|"))
}

fn unconstrained_chains(source: &str, target: &str, hops: u32, index: usize) -> String {
    let chain = |k: u32| -> String {
        let mut triples = Vec::with_capacity(k as usize);
        let mut subject = source.to_string();
        for step in 1..=k {
            let object = if step == k {
                target.to_string()
            } else {
                format!("?x_e{index}_k{k}_{step}")
            };
            triples.push(format!("{subject} ?p_e{index}_k{k}_{step} {object} ."));
            subject = object;
        }
        triples.join(" ")
    };

    if hops == 1 {
        return chain(1);
    }
    (1..=hops)
        .map(|k| format!("{{ {} }}", chain(k)))
        .collect::<Vec<_>>()
        .join(" UNION ")
}

fn object_term(value: &FilterValue) -> String {
    if value.is_iri() {
        format!("<{value}>")
    } else {
        format!("\"{}\"", escape_literal(&value.to_string()))
    }
}

/// Escape a literal body with SPARQL `ECHAR`s; raw line breaks are not
/// allowed inside `"..."`.
fn escape_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DataNodeInfo, NodeId, QueryNode};

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw)
    }

    fn pair() -> QueryGraph {
        QueryGraph::new()
            .with_node(QueryNode::entity(id(0), "urn:Valve", Some("valve".into())))
            .with_node(QueryNode::entity(id(1), "urn:Pump", Some("pump".into())))
    }

    fn compiled(graph: &QueryGraph) -> String {
        compile(graph, &CompileOptions::default())
    }

    #[test]
    fn empty_graph_selects_nothing() {
        assert_eq!(compiled(&QueryGraph::new()), "SELECT DISTINCT * WHERE { }");
    }

    #[test]
    fn single_unconstrained_hop_is_one_triple() {
        let g = pair().with_edge(QueryEdge::new(id(0), id(1), 1), None);
        assert_eq!(
            compiled(&g),
            "SELECT DISTINCT ?v0 ?v1\nWHERE {\n  ?v0 a <urn:Valve> .\n  ?v1 a <urn:Pump> .\n  \
             ?v0 ?p_e0_k1_1 ?v1 .\n}"
        );
    }

    #[test]
    fn unconstrained_hops_union_every_length() {
        let g = pair().with_edge(QueryEdge::new(id(0), id(1), 2), None);
        let text = compiled(&g);
        assert!(text.contains(
            "{ ?v0 ?p_e0_k1_1 ?v1 . } UNION \
             { ?v0 ?p_e0_k2_1 ?x_e0_k2_1 . ?x_e0_k2_1 ?p_e0_k2_2 ?v1 . }"
        ));
    }

    #[test]
    fn constrained_single_hop_alternates_predicates() {
        let edge = QueryEdge::new(id(0), id(1), 1)
            .with_predicates(Some(vec![
                "urn:feeds".into(),
                "urn:hasPart".into(),
                "urn:feeds".into(),
            ]));
        let text = compiled(&pair().with_edge(edge, None));
        assert!(text.contains("?v0 (<urn:feeds>|<urn:hasPart>) ?v1 ."));
    }

    #[test]
    fn constrained_multi_hop_repeats_each_predicate() {
        let edge = QueryEdge::new(id(0), id(1), 2)
            .with_predicates(Some(vec!["urn:p".into(), "urn:q".into()]));
        let text = compiled(&pair().with_edge(edge, None));
        assert!(text.contains("?v0 (<urn:p>|<urn:p>/<urn:p>|<urn:q>|<urn:q>/<urn:q>) ?v1 ."));
    }

    #[test]
    fn data_nodes_require_an_external_reference_and_filters() {
        let mut filters = std::collections::BTreeMap::new();
        filters.insert(
            "urn:hasUnit".to_string(),
            FilterValue::from("http://qudt.org/vocab/unit/DEG_C"),
        );
        filters.insert("urn:label".to_string(), FilterValue::from(r#"say "hi" \o/"#));
        filters.insert("urn:enabled".to_string(), FilterValue::from(true));
        filters.insert("urn:scale".to_string(), FilterValue::from(2.0));

        let g = QueryGraph::new()
            .with_node(QueryNode::data_leaf(id(0), None, None, None))
            .with_data_node(DataNodeInfo::new(id(0)).with_filters(filters));
        let text = compiled(&g);

        assert!(text.contains(&format!("?v0 <{HAS_EXTERNAL_REFERENCE}> ?ext0 .")));
        assert!(text.contains("?v0 <urn:hasUnit> <http://qudt.org/vocab/unit/DEG_C> ."));
        assert!(text.contains(r#"?v0 <urn:label> "say \"hi\" \\o/" ."#));
        assert!(text.contains(r#"?v0 <urn:enabled> "true" ."#));
        assert!(text.contains(r#"?v0 <urn:scale> "2.0" ."#));
        assert!(!text.contains(" a <"));
    }

    #[test]
    fn control_characters_in_literals_are_escaped() {
        let g = QueryGraph::new()
            .with_node(QueryNode::data_leaf(id(0), None, None, None))
            .with_data_node(DataNodeInfo::new(id(0)).with_filters(
                [("urn:note".to_string(), FilterValue::from("one\ntwo\r\tthree"))].into(),
            ));
        let text = compiled(&g);
        assert!(text.contains(r#"?v0 <urn:note> "one\ntwo\r\tthree" ."#));
        assert!(!text.contains('\r'));
        assert!(!text.contains('\t'));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn custom_external_reference_predicate() {
        let g = QueryGraph::new()
            .with_node(QueryNode::data_leaf(id(3), None, None, None))
            .with_data_node(DataNodeInfo::new(id(3)));
        let options = CompileOptions {
            external_reference: "urn:ref".into(),
        };
        assert!(compile(&g, &options).contains("?v3 <urn:ref> ?ext3 ."));
    }
}
