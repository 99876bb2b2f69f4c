//! Lexicon artifact: ontology concepts and their known surface forms.
//!
//! The lexicon is produced offline by scanning an ontology and is consumed
//! read-only by the [`ConceptMatcher`](crate::matcher::ConceptMatcher). Layout:
//!
//! ```json
//! {
//!   "version": "1.4",
//!   "abbrev": { "ahu": ["air handling unit"] },
//!   "concepts": {
//!     "https://brickschema.org/schema/Brick#AHU": {
//!       "kind": "class",
//!       "label": "Air Handling Unit",
//!       "surfaces": ["AHU", "air handling unit"]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LexiconError;

pub type LexiconResult<T> = std::result::Result<T, LexiconError>;

/// What an ontology identifier names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum ConceptKind {
    Class,
    Predicate,
    #[default]
    Other,
}

impl From<Option<String>> for ConceptKind {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(ConceptKind::from).unwrap_or_default()
    }
}

impl From<&str> for ConceptKind {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "class" => Self::Class,
            "predicate" => Self::Predicate,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Predicate => write!(f, "predicate"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One concept record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptEntry {
    #[serde(default)]
    pub kind: ConceptKind,
    /// Canonical label. Lexicons built from unlabelled ontology terms carry `null`.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub surfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The full lexicon: concepts keyed by identifier plus the abbreviation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub abbrev: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub concepts: BTreeMap<String, ConceptEntry>,
}

impl Lexicon {
    /// Create an empty lexicon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a lexicon from its JSON text.
    pub fn from_json_str(json: &str) -> LexiconResult<Self> {
        serde_json::from_str(json).map_err(|e| LexiconError::Parse {
            message: e.to_string(),
        })
    }

    /// Load a lexicon JSON file.
    pub fn load(path: &Path) -> LexiconResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let lexicon = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            concepts = lexicon.concepts.len(),
            abbreviations = lexicon.abbrev.len(),
            version = lexicon.version.as_deref().unwrap_or("unversioned"),
            "loaded lexicon"
        );
        Ok(lexicon)
    }

    /// Add a concept (builder style).
    pub fn with_concept<I, S>(
        mut self,
        uri: impl Into<String>,
        kind: ConceptKind,
        label: impl Into<String>,
        surfaces: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concepts.insert(
            uri.into(),
            ConceptEntry {
                kind,
                label: Some(label.into()),
                surfaces: surfaces.into_iter().map(Into::into).collect(),
                comment: None,
            },
        );
        self
    }

    /// Add an abbreviation with its expansion phrases (builder style).
    pub fn with_abbrev<I, S>(mut self, short: impl Into<String>, expansions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.abbrev
            .entry(short.into())
            .or_default()
            .extend(expansions.into_iter().map(Into::into));
        self
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}
