//! Session-scoped dispatcher over the immutable builder.
//!
//! Each session id owns its current [`Query`] value. An operation reads that
//! value, runs the builder and publishes the result only when it succeeds, so
//! a rejected operation leaves the session exactly as it was. Builder values
//! share structure, so holding many sessions is cheap.
//!
//! Operations arrive as [`QueryOp`] bundles, either one at a time from a
//! transport or in order from a JSON plan file:
//!
//! ```json
//! [
//!   {"op": "find_entity", "class": "Valve", "alias": "valve"},
//!   {"op": "find_related", "class": "Pump", "alias": "pump", "from": "valve", "hops": 1},
//!   {"session": "other", "op": "find_entity", "class": "Chiller"},
//!   {"op": "relate_to", "other": "other"}
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::config::QueryConfig;
use crate::error::SessionError;
use crate::graph::FilterValue;
use crate::query::{
    AllDataOptions, CompileOptions, DataOptions, Query, QuerySnapshot, RelateOptions,
    RelatedOptions,
};

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Session used when a plan step does not name one.
pub const DEFAULT_SESSION: &str = "main";

/// One builder operation with its arguments.
///
/// Class, predicate and path terms may be bare local names or prefixed names;
/// they are expanded against the configured namespace. Missing hop counts use
/// the configured default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryOp {
    FindEntity {
        class: String,
        alias: Option<String>,
    },
    FindRelated {
        class: String,
        alias: Option<String>,
        from: Option<String>,
        hops: Option<u32>,
        predicates: Option<Vec<String>>,
        #[serde(default)]
        multi_hop_predicates: bool,
    },
    RelateTo {
        /// Session whose current query is merged in.
        other: String,
        from: Option<String>,
        to: Option<String>,
        hops: Option<u32>,
        predicates: Option<Vec<String>>,
    },
    FindData {
        from: Option<String>,
        path: Option<String>,
        class: Option<String>,
        hops: Option<u32>,
        #[serde(default)]
        filters: BTreeMap<String, FilterValue>,
        alias: Option<String>,
    },
    FindAllData {
        class: Option<String>,
        hops: Option<u32>,
        #[serde(default)]
        filters: BTreeMap<String, FilterValue>,
        alias: Option<String>,
    },
    FilterDataNodes {
        predicate: String,
        value: FilterValue,
        from: Option<String>,
    },
    Reset,
}

impl QueryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FindEntity { .. } => "find_entity",
            Self::FindRelated { .. } => "find_related",
            Self::RelateTo { .. } => "relate_to",
            Self::FindData { .. } => "find_data",
            Self::FindAllData { .. } => "find_all_data",
            Self::FilterDataNodes { .. } => "filter_data_nodes",
            Self::Reset => "reset",
        }
    }
}

/// A plan step: an operation and the session it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(flatten)]
    pub op: QueryOp,
}

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

/// Parse a plan from JSON text.
pub fn parse_plan(json: &str) -> SessionResult<Vec<PlanStep>> {
    serde_json::from_str(json).map_err(|e| SessionError::Plan {
        message: e.to_string(),
    })
}

/// Read and parse a plan file.
pub fn load_plan(path: &Path) -> SessionResult<Vec<PlanStep>> {
    let content = std::fs::read_to_string(path).map_err(|e| SessionError::Plan {
        message: format!("{}: {e}", path.display()),
    })?;
    parse_plan(&content)
}

/// Map from session id to that session's current query.
pub struct SessionStore {
    sessions: DashMap<String, Query>,
    config: QueryConfig,
}

impl SessionStore {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Apply `op` to `session` and return the session's new query.
    ///
    /// Sessions start empty on their first operation. On error the session
    /// keeps its previous value.
    pub fn apply(&self, session: &str, op: QueryOp) -> SessionResult<Query> {
        let operation = op.name();
        if matches!(op, QueryOp::Reset) {
            self.reset(session);
            return Ok(Query::new());
        }

        // Clone the other operand before locking this session's entry.
        let other = match &op {
            QueryOp::RelateTo { other, .. } => Some(self.get(other)?),
            _ => None,
        };

        let next = match self.sessions.entry(session.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = self.run(entry.get(), op, other.as_ref())?;
                entry.insert(next.clone());
                next
            }
            Entry::Vacant(entry) => {
                let next = self.run(&Query::new(), op, other.as_ref())?;
                entry.insert(next.clone());
                next
            }
        };

        tracing::debug!(session, operation, nodes = next.graph().len(), "applied operation");
        Ok(next)
    }

    fn run(&self, query: &Query, op: QueryOp, other: Option<&Query>) -> SessionResult<Query> {
        let cfg = &self.config;
        let hops = |h: Option<u32>| h.unwrap_or(cfg.default_hops);
        let expand_all = |terms: Option<Vec<String>>| {
            terms.map(|ts| ts.iter().map(|t| cfg.expand_term(t)).collect::<Vec<_>>())
        };
        let expand_filters = |filters: BTreeMap<String, FilterValue>| {
            filters
                .into_iter()
                .map(|(p, v)| (cfg.expand_term(&p), v))
                .collect::<BTreeMap<_, _>>()
        };

        let next = match op {
            QueryOp::FindEntity { class, alias } => {
                query.find_entity(cfg.expand_term(&class), alias.as_deref())
            }
            QueryOp::FindRelated {
                class,
                alias,
                from,
                hops: h,
                predicates,
                multi_hop_predicates,
            } => query.find_related(
                cfg.expand_term(&class),
                RelatedOptions {
                    alias,
                    from,
                    hops: hops(h),
                    predicates: expand_all(predicates),
                    multi_hop_predicates,
                },
            )?,
            QueryOp::RelateTo {
                other: other_session,
                from,
                to,
                hops: h,
                predicates,
            } => {
                let other = other.ok_or(SessionError::UnknownSession {
                    session: other_session,
                })?;
                query.relate_to(
                    other,
                    RelateOptions {
                        from,
                        to,
                        hops: hops(h),
                        predicates: expand_all(predicates),
                    },
                )?
            }
            QueryOp::FindData {
                from,
                path,
                class,
                hops: h,
                filters,
                alias,
            } => query.find_data(DataOptions {
                from,
                path: path.map(|p| cfg.expand_term(&p)),
                class: class.map(|c| cfg.expand_term(&c)),
                hops: hops(h),
                filters: expand_filters(filters),
                alias,
            })?,
            QueryOp::FindAllData {
                class,
                hops: h,
                filters,
                alias,
            } => query.find_all_data(AllDataOptions {
                class: class.map(|c| cfg.expand_term(&c)),
                hops: hops(h),
                filters: expand_filters(filters),
                alias,
            })?,
            QueryOp::FilterDataNodes {
                predicate,
                value,
                from,
            } => query.filter_data_nodes(cfg.expand_term(&predicate), value, from.as_deref())?,
            QueryOp::Reset => Query::new(),
        };
        Ok(next)
    }

    /// Current query of `session`.
    pub fn get(&self, session: &str) -> SessionResult<Query> {
        self.sessions
            .get(session)
            .map(|r| r.value().clone())
            .ok_or_else(|| SessionError::UnknownSession {
                session: session.to_string(),
            })
    }

    /// Structural snapshot of the session's current query.
    pub fn snapshot(&self, session: &str) -> SessionResult<QuerySnapshot> {
        Ok(self.get(session)?.to_dict())
    }

    /// Compiled query text of the session's current query.
    pub fn sparql(&self, session: &str) -> SessionResult<String> {
        let compile = CompileOptions {
            external_reference: self.config.external_reference.clone(),
        };
        Ok(self.get(session)?.to_sparql_with(&compile))
    }

    /// Drop the session's query; the next operation starts from empty.
    pub fn reset(&self, session: &str) {
        if self.sessions.remove(session).is_some() {
            tracing::info!(session, "session reset");
        }
    }

    /// Apply every step in order, stopping at the first failure.
    pub fn run_plan(&self, steps: &[PlanStep]) -> SessionResult<usize> {
        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = self.apply(&step.session, step.op.clone()) {
                tracing::warn!(
                    step = index,
                    session = %step.session,
                    op = step.op.name(),
                    error = %e,
                    "plan step failed"
                );
                return Err(e);
            }
        }
        Ok(steps.len())
    }

    /// Session ids, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::graph::NodeId;

    const BRICK: &str = "https://brickschema.org/schema/Brick#";

    fn entity(class: &str, alias: &str) -> QueryOp {
        QueryOp::FindEntity {
            class: class.into(),
            alias: Some(alias.into()),
        }
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::default();
        store.apply("a", entity("Valve", "valve")).unwrap();
        store.apply("b", entity("Pump", "pump")).unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.graph().len(), 1);
        assert_eq!(
            a.graph().node(NodeId::new(0)).and_then(|n| n.class.clone()),
            Some(format!("{BRICK}Valve"))
        );
        assert_eq!(store.sessions(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn failed_operation_keeps_the_previous_value() {
        let store = SessionStore::default();
        store.apply("s", entity("Valve", "valve")).unwrap();
        let before = store.get("s").unwrap().to_dict();

        let err = store
            .apply(
                "s",
                QueryOp::FilterDataNodes {
                    predicate: "hasUnit".into(),
                    value: "DEG_C".into(),
                    from: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::Query(QueryError::NoDataNodes)));
        assert_eq!(store.get("s").unwrap().to_dict(), before);
    }

    #[test]
    fn unknown_sessions_cannot_be_read() {
        let store = SessionStore::default();
        assert!(matches!(store.get("ghost"), Err(SessionError::UnknownSession { .. })));
        let err = store
            .apply(
                "main",
                QueryOp::RelateTo {
                    other: "ghost".into(),
                    from: None,
                    to: None,
                    hops: None,
                    predicates: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession { session } if session == "ghost"));
        assert!(store.is_empty());
    }

    #[test]
    fn readers_use_the_configured_external_reference() {
        let store = SessionStore::default();
        store.apply("s", entity("Valve", "valve")).unwrap();
        store
            .apply(
                "s",
                QueryOp::FindData {
                    from: None,
                    path: None,
                    class: None,
                    hops: None,
                    filters: BTreeMap::new(),
                    alias: None,
                },
            )
            .unwrap();

        let sparql = store.sparql("s").unwrap();
        assert!(sparql.contains(&format!("?v1 <{}> ", store.config().external_reference)));
        assert_eq!(store.snapshot("s").unwrap().data_nodes.len(), 1);
        assert!(matches!(store.sparql("ghost"), Err(SessionError::UnknownSession { .. })));
    }

    #[test]
    fn reset_drops_the_session() {
        let store = SessionStore::default();
        store.apply("s", entity("Valve", "valve")).unwrap();
        let fresh = store.apply("s", QueryOp::Reset).unwrap();
        assert!(fresh.graph().is_empty());
        assert!(store.get("s").is_err());
    }

    #[test]
    fn plan_steps_default_to_the_main_session() {
        let steps = parse_plan(
            r#"[
                {"op": "find_entity", "class": "Valve", "alias": "valve"},
                {"op": "find_related", "class": "brick:Pump", "alias": "pump", "from": "valve", "hops": 1,
                 "predicates": ["feeds"]},
                {"session": "other", "op": "find_entity", "class": "urn:x#Chiller", "alias": "chiller"},
                {"op": "relate_to", "other": "other"},
                {"op": "find_data", "from": "pump", "filters": {"hasUnit": "DEG_C", "scale": 2}},
                {"op": "filter_data_nodes", "predicate": "hasMedium", "value": "water"}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps[0].session, DEFAULT_SESSION);
        assert_eq!(steps[2].session, "other");

        let store = SessionStore::default();
        assert_eq!(store.run_plan(&steps).unwrap(), 6);

        let main = store.get(DEFAULT_SESSION).unwrap();
        let g = main.graph();
        assert_eq!(g.len(), 4);
        assert_eq!(g.edges()[0].predicates, Some(vec![format!("{BRICK}feeds")]));
        let data = g.resolve_alias(Some("pump_data")).unwrap();
        let filters = &g.data_nodes()[&data].filters;
        assert_eq!(filters[&format!("{BRICK}hasUnit")], FilterValue::from("DEG_C"));
        assert_eq!(filters[&format!("{BRICK}scale")], FilterValue::Int(2));
        assert_eq!(filters[&format!("{BRICK}hasMedium")], FilterValue::from("water"));
    }

    #[test]
    fn malformed_plans_are_rejected() {
        assert!(matches!(parse_plan("{}"), Err(SessionError::Plan { .. })));
        assert!(matches!(
            parse_plan(r#"[{"op": "teleport"}]"#),
            Err(SessionError::Plan { .. })
        ));
        assert!(matches!(
            load_plan(Path::new("/nonexistent/plan.json")),
            Err(SessionError::Plan { .. })
        ));
    }

    #[test]
    fn plan_stops_at_the_first_failure() {
        let steps = parse_plan(
            r#"[
                {"op": "find_entity", "class": "Valve"},
                {"op": "find_related", "class": "Pump", "from": "missing"},
                {"op": "find_entity", "class": "Tank"}
            ]"#,
        )
        .unwrap();
        let store = SessionStore::default();
        assert!(store.run_plan(&steps).is_err());
        assert_eq!(store.get(DEFAULT_SESSION).unwrap().graph().len(), 1);
    }
}
