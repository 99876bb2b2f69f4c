//! Executing compiled queries.
//!
//! The builder only produces query text. Running it is the job of a
//! [`QueryExecutor`]; [`SparqlStore`] is the in-process implementation backed
//! by oxigraph, used by the CLI `run` command and by tests that check compiled
//! patterns against real data.

use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::{GraphNameRef, Literal, NamedNode, Quad, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::ExecError;

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// One solution: `(variable, term)` pairs in projection order. Terms are in
/// N-Triples form (`<iri>`, `"literal"`).
pub type Row = Vec<(String, String)>;

/// Runs SELECT queries against some triple store.
pub trait QueryExecutor {
    fn select(&self, sparql: &str) -> ExecResult<Vec<Row>>;
}

/// In-memory SPARQL store.
pub struct SparqlStore {
    store: Store,
}

impl SparqlStore {
    pub fn in_memory() -> ExecResult<Self> {
        let store = Store::new().map_err(|e| ExecError::Sparql {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store })
    }

    /// Load an RDF file, picking the syntax from its extension.
    pub fn load_file(&self, path: &Path) -> ExecResult<usize> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| ExecError::UnsupportedFormat {
                path: path.display().to_string(),
            })?;
        let file = std::fs::File::open(path).map_err(|source| ExecError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let before = self.len()?;
        self.store
            .load_from_reader(format, std::io::BufReader::new(file))
            .map_err(|e| ExecError::Sparql {
                message: format!("failed to load {}: {e}", path.display()),
            })?;
        let loaded = self.len()?.saturating_sub(before);
        tracing::info!(path = %path.display(), triples = loaded, "loaded RDF data");
        Ok(loaded)
    }

    fn named(iri: &str) -> ExecResult<NamedNode> {
        NamedNode::new(iri).map_err(|e| ExecError::Sparql {
            message: format!("invalid IRI <{iri}>: {e}"),
        })
    }

    fn insert(
        &self,
        subject: NamedNode,
        predicate: NamedNode,
        object: impl Into<Term>,
    ) -> ExecResult<()> {
        let quad = Quad::new(subject, predicate, object, GraphNameRef::DefaultGraph);
        self.store.insert(&quad).map_err(|e| ExecError::Sparql {
            message: format!("insert failed: {e}"),
        })?;
        Ok(())
    }

    /// Insert an IRI-valued triple into the default graph.
    pub fn insert_triple(&self, subject: &str, predicate: &str, object: &str) -> ExecResult<()> {
        self.insert(Self::named(subject)?, Self::named(predicate)?, Self::named(object)?)
    }

    /// Insert a triple with a plain string literal object.
    pub fn insert_literal(&self, subject: &str, predicate: &str, value: &str) -> ExecResult<()> {
        self.insert(
            Self::named(subject)?,
            Self::named(predicate)?,
            Literal::new_simple_literal(value),
        )
    }

    /// Execute a SELECT query and return one row per solution.
    pub fn query_select(&self, sparql: &str) -> ExecResult<Vec<Row>> {
        let results = self.store.query(sparql).map_err(|e| ExecError::Sparql {
            message: format!("SPARQL query failed: {e}"),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| ExecError::Sparql {
                        message: format!("solution error: {e}"),
                    })?;
                    rows.push(
                        solution
                            .iter()
                            .map(|(var, term)| (var.as_str().to_string(), term.to_string()))
                            .collect(),
                    );
                }
                tracing::debug!(rows = rows.len(), "query evaluated");
                Ok(rows)
            }
            QueryResults::Boolean(_) | QueryResults::Graph(_) => Err(ExecError::Sparql {
                message: "only SELECT queries are supported".into(),
            }),
        }
    }

    /// Number of triples in the store.
    pub fn len(&self) -> ExecResult<usize> {
        self.store.len().map_err(|e| ExecError::Sparql {
            message: format!("failed to count triples: {e}"),
        })
    }

    pub fn is_empty(&self) -> ExecResult<bool> {
        self.len().map(|n| n == 0)
    }
}

impl QueryExecutor for SparqlStore {
    fn select(&self, sparql: &str) -> ExecResult<Vec<Row>> {
        self.query_select(sparql)
    }
}

impl std::fmt::Debug for SparqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlStore").finish()
    }
}
