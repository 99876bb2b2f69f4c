//! Rich diagnostic error types for graframe.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know which argument to fix.
//! Every error here is caller-correctable: nothing is retried and no partial
//! state is ever published when one is returned.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for graframe.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the CLI.
#[derive(Debug, Error, Diagnostic)]
pub enum GraframeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexicon(#[from] LexiconError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),
}

// ---------------------------------------------------------------------------
// Query builder errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum QueryError {
    #[error("{operation}: no source node (pointer is unset and no `from` alias was given)")]
    #[diagnostic(
        code(graframe::query::no_source),
        help(
            "Start the pattern with `find_entity` so there is a current pointer, \
             or pass `from` with the alias of an existing node."
        )
    )]
    NoSource { operation: &'static str },

    #[error("{operation}: the other query has no target node")]
    #[diagnostic(
        code(graframe::query::no_target),
        help("The query being related to is empty. Add an entity to it first, or pass `to`.")
    )]
    NoTarget { operation: &'static str },

    #[error("{operation}: alias `{alias}` is not defined in the query graph")]
    #[diagnostic(
        code(graframe::query::unknown_alias),
        help("Aliases are case-sensitive. Inspect the snapshot to list the defined aliases.")
    )]
    UnknownAlias {
        operation: &'static str,
        alias: String,
    },

    #[error("{operation}: the query graph has no nodes to expand from")]
    #[diagnostic(
        code(graframe::query::empty_graph),
        help("The `*`/`all` selector needs at least one node. Add an entity first.")
    )]
    EmptyGraph { operation: &'static str },

    #[error("no data nodes exist in the query graph to filter")]
    #[diagnostic(
        code(graframe::query::no_data_nodes),
        help("Attach data nodes with `find_data` or `find_all_data` before filtering.")
    )]
    NoDataNodes,

    #[error("filter_data_nodes: no target data nodes selected")]
    #[diagnostic(
        code(graframe::query::no_filter_targets),
        help(
            "The `from` node has no data nodes attached directly to it. \
             Point `from` at a data node alias, or attach data to the entity first."
        )
    )]
    NoFilterTargets,

    #[error("hop count must be >= 1, got {hops}")]
    #[diagnostic(
        code(graframe::query::invalid_hops),
        help("Use 1 for a direct relation, or a larger bound for a path of up to that many steps.")
    )]
    InvalidHops { hops: u32 },
}

// ---------------------------------------------------------------------------
// Lexicon errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LexiconError {
    #[error("failed to read lexicon: {path}")]
    #[diagnostic(
        code(graframe::lexicon::io),
        help("Check that the lexicon file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lexicon: {message}")]
    #[diagnostic(
        code(graframe::lexicon::parse),
        help(
            "The lexicon must be a JSON object with `concepts` (identifier -> \
             {{kind, label, surfaces}}) and `abbrev` (short form -> [phrases])."
        )
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    #[error("SPARQL query error: {message}")]
    #[diagnostic(
        code(graframe::exec::sparql),
        help(
            "The store rejected the query or failed while evaluating it. \
             Print the compiled query and check the class and predicate IRIs."
        )
    )]
    Sparql { message: String },

    #[error("failed to read RDF data: {path}")]
    #[diagnostic(
        code(graframe::exec::io),
        help("Check that the data file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported RDF format: {path}")]
    #[diagnostic(
        code(graframe::exec::unsupported_format),
        help("Use a file with a .ttl, .nt, .nq, .trig, .n3 or .rdf extension.")
    )]
    UnsupportedFormat { path: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(graframe::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(graframe::config::parse),
        help("Check the TOML syntax and the section names ([matcher], [query]).")
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("unknown session: {session}")]
    #[diagnostic(
        code(graframe::session::unknown),
        help("Sessions come into existence on their first builder operation.")
    )]
    UnknownSession { session: String },

    #[error("invalid plan: {message}")]
    #[diagnostic(
        code(graframe::session::plan),
        help(
            "A plan is a JSON array of steps such as \
             {{\"op\": \"find_entity\", \"class\": \"Valve\", \"alias\": \"valve\"}}."
        )
    )]
    Plan { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),
}

/// Convenience alias for functions returning graframe results.
pub type GraframeResult<T> = std::result::Result<T, GraframeError>;
