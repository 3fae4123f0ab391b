//! Weighted needle expansion for tolerance-aware matching.

use super::stem::simple_stem;
use crate::models::{SearchQuery, SearchTolerance};

/// Exact-match weight.
const WEIGHT_EXACT: f64 = 1.0;
/// Weight of a stemmed variant.
const WEIGHT_STEMMED: f64 = 0.8;
/// Weight of an inflected variant.
const WEIGHT_INFLECTED: f64 = 0.6;

/// Words this short are matched exactly and never expanded.
const MIN_EXPANSION_LENGTH: usize = 3;

/// A substring needle with a relevance weight.
///
/// The weight records how far the needle strayed from what the caller
/// typed; backends use the needles for matching and may use the weight for
/// diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedNeedle {
    /// Lowercased substring to look for.
    pub text: String,
    /// Relevance weight in `(0.0, 1.0]`.
    pub weight: f64,
}

impl WeightedNeedle {
    fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Expands one query word into its needle variants for a tolerance level.
///
/// The exact word (lowercased) is always the first needle at weight 1.0.
/// `Normal` adds the stemmed form at 0.8; `Fuzzy` additionally adds
/// `y`→`ies`/`ied` inflections of the stem at 0.6. Words shorter than three
/// characters are never expanded. Duplicates keep their highest weight.
#[must_use]
pub fn expand_word(word: &str, tolerance: SearchTolerance) -> Vec<WeightedNeedle> {
    let word = word.to_lowercase();
    let mut needles = vec![WeightedNeedle::new(word.clone(), WEIGHT_EXACT)];

    if tolerance == SearchTolerance::Strict || word.len() < MIN_EXPANSION_LENGTH {
        return needles;
    }

    let stem = simple_stem(&word);
    if stem != word {
        push_unique(&mut needles, WeightedNeedle::new(stem.clone(), WEIGHT_STEMMED));
    }

    if tolerance == SearchTolerance::Fuzzy
        && let Some(base) = stem.strip_suffix('y')
        && !base.is_empty()
    {
        push_unique(
            &mut needles,
            WeightedNeedle::new(format!("{base}ies"), WEIGHT_INFLECTED),
        );
        push_unique(
            &mut needles,
            WeightedNeedle::new(format!("{base}ied"), WEIGHT_INFLECTED),
        );
    }

    needles
}

/// Expands every word of a query into its needle group.
///
/// Each group corresponds to one query word; a memory matches a group when
/// any needle in it matches (OR), and groups combine across words according
/// to the query's match mode.
#[must_use]
pub fn expand_query(query: &SearchQuery) -> Vec<Vec<WeightedNeedle>> {
    query
        .words()
        .iter()
        .map(|word| expand_word(word, query.tolerance))
        .collect()
}

fn push_unique(needles: &mut Vec<WeightedNeedle>, candidate: WeightedNeedle) {
    if !needles.iter().any(|n| n.text == candidate.text) {
        needles.push(candidate);
    }
}
