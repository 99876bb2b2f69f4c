//! Concept matcher: resolves free text and abbreviations to ontology identifiers.
//!
//! The matcher indexes every surface form of every lexicon concept once, then
//! scores a query against the whole index with four signals:
//!
//! - **Token overlap**: Jaccard similarity of singularized token sets (weight 0.62)
//! - **Phrase similarity**: longest-matching-blocks ratio of normalized text (weight 0.32)
//! - **Initialism bonus**: +0.12 when both sides share the same initials
//! - **Edit bonus**: up to +0.09 for near-identical strings (bounded Damerau-Levenshtein)
//!
//! A length penalty discourages short queries landing on long phrases, and a
//! guardrail drops candidates that share no vocabulary and are not nearly
//! identical as strings. Abbreviations listed in the lexicon are expanded into
//! extra query forms before scoring.

pub mod normalize;
pub mod similarity;

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lexicon::{ConceptKind, Lexicon};

use normalize::{initialism, normalize_text, tokenize};
use similarity::{damerau_levenshtein, jaccard, seq_ratio};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SCORE: f64 = 0.55;

const TOKEN_WEIGHT: f64 = 0.62;
const PHRASE_WEIGHT: f64 = 0.32;
const INITIALISM_BONUS: f64 = 0.12;
const EDIT_STEP_BONUS: f64 = 0.03;
const LENGTH_PENALTY: f64 = 0.08;
/// Without shared tokens, a candidate needs at least this phrase similarity.
const GUARDRAIL_PHRASE: f64 = 0.85;

/// Why a candidate was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Exact,
    Fuzzy,
    InitialismMatch,
    AbbrevExpansion,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::InitialismMatch => write!(f, "initialism_match"),
            Self::AbbrevExpansion => write!(f, "abbrev_expansion"),
        }
    }
}

/// A ranked candidate concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub uri: String,
    pub kind: ConceptKind,
    pub label: String,
    pub score: f64,
    pub reason: MatchReason,
    /// The raw surface form that produced the score.
    pub matched_surface: String,
}

impl MatchResult {
    /// Identifier text after the last `#` or `/`.
    pub fn local_name(&self) -> &str {
        self.uri.rsplit(['#', '/']).next().unwrap_or(&self.uri)
    }
}

/// Knobs for a single match call.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    /// Only consider these kinds; empty admits every kind.
    pub restrict_kinds: Vec<ConceptKind>,
    pub top_k: usize,
    pub min_score: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            restrict_kinds: Vec::new(),
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl MatchOptions {
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = ConceptKind>) -> Self {
        self.restrict_kinds = kinds.into_iter().collect();
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    fn admits(&self, kind: ConceptKind) -> bool {
        self.restrict_kinds.is_empty() || self.restrict_kinds.contains(&kind)
    }
}

/// One indexed surface form.
#[derive(Debug, Clone)]
struct IndexedSurface {
    uri: String,
    kind: ConceptKind,
    label: String,
    surface: String,
    tokens: Vec<String>,
    initials: String,
    normalized: String,
}

/// A query variant to score: the raw query or one of its abbreviation expansions.
#[derive(Debug)]
struct QueryForm {
    normalized: String,
    tokens: Vec<String>,
    initials: String,
    from_expansion: bool,
}

impl QueryForm {
    fn new(text: &str, from_expansion: bool) -> Self {
        let tokens = tokenize(text);
        Self {
            normalized: normalize_text(text),
            initials: initialism(&tokens),
            tokens,
            from_expansion,
        }
    }
}

/// Read-only fuzzy matcher over a prebuilt lexicon.
///
/// The index is built once in [`ConceptMatcher::new`]; matching never mutates
/// it, so a matcher can be shared across threads without locking.
#[derive(Debug, Clone)]
pub struct ConceptMatcher {
    index: Vec<IndexedSurface>,
    /// Normalized abbreviation -> normalized expansion phrases.
    abbrev: HashMap<String, Vec<String>>,
    concept_count: usize,
}

impl ConceptMatcher {
    /// Index every surface form (label first, duplicates removed) of every concept.
    pub fn new(lexicon: &Lexicon) -> Self {
        let mut abbrev: HashMap<String, Vec<String>> = HashMap::new();
        for (short, expansions) in &lexicon.abbrev {
            let phrases = abbrev.entry(normalize_text(short)).or_default();
            for expansion in expansions {
                let phrase = normalize_text(expansion);
                if !phrases.contains(&phrase) {
                    phrases.push(phrase);
                }
            }
        }

        let mut index = Vec::new();
        for (uri, entry) in &lexicon.concepts {
            let label = entry.label.clone().unwrap_or_else(|| uri.clone());
            let mut surfaces: Vec<&str> = Vec::with_capacity(entry.surfaces.len() + 1);
            let extra = entry.surfaces.iter().map(String::as_str);
            for surface in std::iter::once(label.as_str()).chain(extra) {
                if !surfaces.contains(&surface) {
                    surfaces.push(surface);
                }
            }
            for surface in surfaces {
                let tokens = tokenize(surface);
                index.push(IndexedSurface {
                    uri: uri.clone(),
                    kind: entry.kind,
                    label: label.clone(),
                    surface: surface.to_string(),
                    initials: initialism(&tokens),
                    tokens,
                    normalized: normalize_text(surface),
                });
            }
        }

        tracing::info!(
            concepts = lexicon.concepts.len(),
            surfaces = index.len(),
            abbreviations = abbrev.len(),
            "built concept index"
        );

        Self {
            index,
            abbrev,
            concept_count: lexicon.concepts.len(),
        }
    }

    /// Expansion phrases for a query that is exactly a known abbreviation.
    pub fn expand_abbrev(&self, query: &str) -> &[String] {
        let normalized = normalize_text(query);
        if normalized.is_empty() {
            return &[];
        }
        self.abbrev.get(&normalized).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rank concepts for `query`, best first.
    ///
    /// Every returned score is at least `min_score`, each `(uri, kind)` pair
    /// appears once with its best score, and at most `top_k` results come back.
    /// No candidate clearing the threshold is not an error: the list is empty.
    pub fn match_concepts(&self, query: &str, options: &MatchOptions) -> Vec<MatchResult> {
        if options.top_k == 0 {
            return Vec::new();
        }

        let mut forms = vec![QueryForm::new(query, false)];
        forms.extend(
            self.expand_abbrev(query)
                .iter()
                .map(|expansion| QueryForm::new(expansion, true)),
        );

        let mut ranked: Vec<MatchResult> = Vec::new();
        let mut slots: HashMap<(&str, ConceptKind), usize> = HashMap::new();

        for form in &forms {
            for entry in &self.index {
                if !options.admits(entry.kind) {
                    continue;
                }
                let Some((score, reason)) = score_surface(form, entry) else {
                    continue;
                };
                if score < options.min_score {
                    continue;
                }

                let candidate = MatchResult {
                    uri: entry.uri.clone(),
                    kind: entry.kind,
                    label: entry.label.clone(),
                    score,
                    reason,
                    matched_surface: entry.surface.clone(),
                };
                match slots.get(&(entry.uri.as_str(), entry.kind)) {
                    Some(&slot) => {
                        if outranks(&candidate, &ranked[slot]) {
                            ranked[slot] = candidate;
                        }
                    }
                    None => {
                        slots.insert((entry.uri.as_str(), entry.kind), ranked.len());
                        ranked.push(candidate);
                    }
                }
            }
        }

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| is_exact(b).cmp(&is_exact(a)))
        });
        ranked.truncate(options.top_k);

        tracing::debug!(
            query,
            forms = forms.len(),
            results = ranked.len(),
            best = ranked.first().map(|r| r.uri.as_str()).unwrap_or("-"),
            "matched concepts"
        );
        ranked
    }

    /// Match many queries in parallel, preserving input order.
    pub fn match_batch<S>(&self, queries: &[S], options: &MatchOptions) -> Vec<Vec<MatchResult>>
    where
        S: AsRef<str> + Sync,
    {
        queries
            .par_iter()
            .map(|q| self.match_concepts(q.as_ref(), options))
            .collect()
    }

    /// Number of concepts in the source lexicon.
    pub fn concept_count(&self) -> usize {
        self.concept_count
    }

    /// Number of indexed surface forms.
    pub fn surface_count(&self) -> usize {
        self.index.len()
    }
}

fn is_exact(result: &MatchResult) -> bool {
    result.reason == MatchReason::Exact
}

/// Higher score wins; on a tie an exact match displaces a fuzzy one.
fn outranks(candidate: &MatchResult, current: &MatchResult) -> bool {
    candidate.score > current.score
        || (candidate.score == current.score && is_exact(candidate) && !is_exact(current))
}

/// Score one query form against one surface, or `None` if the guardrail drops it.
///
/// Composite scores are capped at 1.0 so nothing outranks an exact match.
fn score_surface(form: &QueryForm, entry: &IndexedSurface) -> Option<(f64, MatchReason)> {
    if !form.normalized.is_empty() && form.normalized == entry.normalized {
        let reason = if form.from_expansion {
            MatchReason::AbbrevExpansion
        } else {
            MatchReason::Exact
        };
        return Some((1.0, reason));
    }

    let initialism_bonus = if !form.initials.is_empty() && form.initials == entry.initials {
        INITIALISM_BONUS
    } else {
        0.0
    };
    let overlap = jaccard(form.tokens.iter(), entry.tokens.iter());
    let phrase = seq_ratio(&form.normalized, &entry.normalized);

    if overlap == 0.0 && phrase < GUARDRAIL_PHRASE {
        return None;
    }

    // Edit distance only matters for already-close pairs.
    let mut edit_bonus = 0.0;
    if phrase > 0.70 || overlap > 0.50 {
        let max_dist = if form.normalized.chars().count() <= 10 { 2 } else { 3 };
        let distance = damerau_levenshtein(&form.normalized, &entry.normalized, Some(max_dist));
        if distance <= max_dist {
            edit_bonus = (max_dist - distance) as f64 * EDIT_STEP_BONUS;
        }
    }

    let length_penalty = if entry.tokens.len() >= form.tokens.len() + 3 && overlap < 0.8 {
        LENGTH_PENALTY
    } else {
        0.0
    };

    let score = (TOKEN_WEIGHT * overlap + PHRASE_WEIGHT * phrase + initialism_bonus + edit_bonus
        - length_penalty)
        .min(1.0);

    let reason = if form.from_expansion {
        MatchReason::AbbrevExpansion
    } else if initialism_bonus > 0.0 {
        MatchReason::InitialismMatch
    } else {
        MatchReason::Fuzzy
    };
    Some((score, reason))
}
