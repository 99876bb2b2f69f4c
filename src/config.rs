//! Configuration: matcher defaults, builder defaults and the ontology namespace.
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! lexicon = "data/lexicon.json"
//!
//! [matcher]
//! top_k = 5
//! min_score = 0.55
//! restrict_kinds = ["class"]
//!
//! [query]
//! default_hops = 3
//! namespace = "https://brickschema.org/schema/Brick#"
//! prefix = "brick"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lexicon::ConceptKind;
use crate::matcher::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, MatchOptions};
use crate::query::{CompileOptions, DEFAULT_HOPS, HAS_EXTERNAL_REFERENCE};

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraframeConfig {
    /// Lexicon JSON used when the command line does not name one.
    #[serde(default)]
    pub lexicon: Option<PathBuf>,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Empty admits every kind.
    #[serde(default)]
    pub restrict_kinds: Vec<ConceptKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_hops")]
    pub default_hops: u32,
    /// Namespace bare class and predicate names are resolved against.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Prefix accepted in `prefix:Local` terms.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_external_reference")]
    pub external_reference: String,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}
fn default_hops() -> u32 {
    DEFAULT_HOPS
}
fn default_namespace() -> String {
    "https://brickschema.org/schema/Brick#".into()
}
fn default_prefix() -> String {
    "brick".into()
}
fn default_external_reference() -> String {
    HAS_EXTERNAL_REFERENCE.into()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            restrict_kinds: Vec::new(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_hops: default_hops(),
            namespace: default_namespace(),
            prefix: default_prefix(),
            external_reference: default_external_reference(),
        }
    }
}

impl GraframeConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `path` when given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions::default()
            .kinds(self.matcher.restrict_kinds.iter().copied())
            .top_k(self.matcher.top_k)
            .min_score(self.matcher.min_score)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            external_reference: self.query.external_reference.clone(),
        }
    }
}

impl QueryConfig {
    /// Resolve a class or predicate term to an absolute IRI.
    ///
    /// Absolute IRIs (`http://`, `https://`, `urn:`) pass through,
    /// `<prefix>:Local` and bare `Local` land in the namespace.
    pub fn expand_term(&self, term: &str) -> String {
        let term = term.trim();
        if term.starts_with("http://") || term.starts_with("https://") || term.starts_with("urn:") {
            return term.to_string();
        }
        let local = term
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(term);
        format!("{}{local}", self.namespace)
    }
}
