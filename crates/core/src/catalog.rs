//! Fuzzy resolution of spoken item names against a restaurant's menu.
//!
//! Speech transcription reliably mangles dish names ("byriani" for
//! "Biryani"), so exact lookup would reject valid orders. Matching is
//! normalized-Levenshtein similarity with a hard cutoff: below it the
//! caller gets a structured not-found result rather than a guessed item.

use serde::{Deserialize, Serialize};

/// Minimum normalized edit-similarity for a match. Tunable via
/// `catalog.match_threshold`; raising it trades recall for precision.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogMatch {
    pub name: String,
    pub similarity: f64,
}

#[derive(Clone, Debug)]
pub struct CatalogResolver {
    threshold: f64,
}

impl Default for CatalogResolver {
    fn default() -> Self {
        Self { threshold: DEFAULT_MATCH_THRESHOLD }
    }
}

impl CatalogResolver {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0) }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best match for `candidate` among `names`, or `None` when nothing
    /// clears the threshold. Deterministic for identical input sets: ties
    /// break on the lexicographically smaller name, never storage order.
    pub fn resolve<'a, I>(&self, candidate: &str, names: I) -> Option<CatalogMatch>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized_candidate = normalize(candidate);
        if normalized_candidate.is_empty() {
            return None;
        }

        let mut best: Option<CatalogMatch> = None;
        for name in names {
            let similarity =
                similarity_score(&normalized_candidate, &normalize(name));
            if similarity < self.threshold {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => {
                    similarity > current.similarity
                        || (similarity == current.similarity && name < current.name.as_str())
                }
            };
            if better {
                best = Some(CatalogMatch { name: name.to_string(), similarity });
            }
        }

        best
    }
}

/// Similarity of a candidate against a full menu name. A spoken short form
/// ("Biryani" for "Chicken Biryani") scores by the best-aligned word window
/// of the same length, so a partial mention still clears the cutoff without
/// letting unrelated names through.
fn similarity_score(candidate: &str, menu_name: &str) -> f64 {
    let whole = strsim::normalized_levenshtein(candidate, menu_name);

    let candidate_words = candidate.split(' ').count();
    let menu_words: Vec<&str> = menu_name.split(' ').collect();
    if menu_words.len() <= candidate_words {
        return whole;
    }

    menu_words
        .windows(candidate_words)
        .map(|window| strsim::normalized_levenshtein(candidate, &window.join(" ")))
        .fold(whole, f64::max)
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}
