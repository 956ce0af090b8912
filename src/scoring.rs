//! Scoring functions for catalog reconciliation.
//!
//! This module contains:
//! - The multi-signal fuzzy score used after online recognition
//! - Per-signal breakdowns for diagnostics
//! - The weighted title/artist score used for offline sessions
//!
//! Signals are added without renormalization, so totals above 1.0 are normal
//! and only meaningful for ranking.

use serde::Serialize;

use crate::models::CatalogCandidate;
use crate::normalize::{normalize_title, title_words};
use crate::similarity::similarity_ratio;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Minimum score to accept the best candidate
pub const ACCEPTANCE_THRESHOLD: f64 = 0.45;

/// Score assigned when normalized titles are equal
pub const EXACT_MATCH_SCORE: f64 = 2.0;

/// Candidates above this are logged while scanning
pub const LOG_CANDIDATE_THRESHOLD: f64 = 0.3;

/// Offline sessions accept only scores strictly above this
pub const OFFLINE_ACCEPTANCE_THRESHOLD: f64 = 0.5;

pub const OFFLINE_TITLE_WEIGHT: f64 = 0.7;
pub const OFFLINE_ARTIST_WEIGHT: f64 = 0.3;

// ============================================================================
// Weights
// ============================================================================

/// Bonus weights of the fuzzy score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringWeights {
    /// Artist/producer ratio above `artist_ratio_gate`
    pub artist_similar: f64,
    /// Artist contained in producer name or vice versa
    pub artist_contained: f64,
    pub artist_ratio_gate: f64,
    /// One normalized title contained in the other
    pub title_contained: f64,
    /// Multiplier of the shared-word ratio
    pub shared_words: f64,
    pub remix: f64,
    /// Remix words must be longer than this many chars
    pub remix_min_word_len: usize,
    pub exact_match: f64,
}

impl ScoringWeights {
    pub const DEFAULT: ScoringWeights = ScoringWeights {
        artist_similar: 0.2,
        artist_contained: 0.3,
        artist_ratio_gate: 0.5,
        title_contained: 0.2,
        shared_words: 0.3,
        remix: 0.15,
        remix_min_word_len: 3,
        exact_match: EXACT_MATCH_SCORE,
    };
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Breakdown
// ============================================================================

/// Every signal computed for one (hit, candidate) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub hit_title: String,
    pub candidate_title: String,
    pub title_score: f64,
    pub artist_bonus: f64,
    pub contains_bonus: f64,
    pub word_bonus: f64,
    pub remix_bonus: f64,
    /// Normalized titles are equal
    pub exact: bool,
    exact_score: f64,
}

impl ScoreBreakdown {
    /// Sum of all signals, before the exact-match override.
    pub fn weighted_sum(&self) -> f64 {
        self.title_score + self.artist_bonus + self.contains_bonus + self.word_bonus + self.remix_bonus
    }

    /// Final score: the exact-match override wins over the weighted sum.
    pub fn total(&self) -> f64 {
        if self.exact {
            self.exact_score
        } else {
            self.weighted_sum()
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

/// True when both strings are non-empty and one contains the other.
fn mutually_contained(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn artist_bonus(hit_artist: &str, producer: &str, w: &ScoringWeights) -> f64 {
    if hit_artist.is_empty() || producer.is_empty() {
        return 0.0;
    }

    let mut bonus = 0.0;
    if similarity_ratio(hit_artist, producer) > w.artist_ratio_gate {
        bonus = w.artist_similar;
    }
    // Containment is checked last so it overrides the ratio bonus
    if mutually_contained(hit_artist, producer) {
        bonus = w.artist_contained;
    }
    bonus
}

fn word_bonus(hit_title: &str, candidate_title: &str, w: &ScoringWeights) -> f64 {
    let hit_words = title_words(hit_title);
    let candidate_words = title_words(candidate_title);

    let common = hit_words.intersection(&candidate_words).count();
    if common == 0 {
        return 0.0;
    }
    common as f64 / hit_words.len().max(candidate_words.len()) as f64 * w.shared_words
}

fn remix_bonus(hit_title: &str, candidate_title: &str, w: &ScoringWeights) -> f64 {
    if !hit_title.contains("remix") && !candidate_title.contains("remix") {
        return 0.0;
    }
    let shares_long_word = title_words(hit_title)
        .into_iter()
        .any(|word| word.chars().count() > w.remix_min_word_len && candidate_title.contains(word));
    if shares_long_word {
        w.remix
    } else {
        0.0
    }
}

// ============================================================================
// Combined Scoring
// ============================================================================

/// Compute every signal for a recognition hit against one candidate.
pub fn score_breakdown_with(
    weights: &ScoringWeights,
    hit_title: &str,
    hit_artist: &str,
    candidate: &CatalogCandidate,
) -> ScoreBreakdown {
    let n_title = normalize_title(hit_title);
    let n_artist = normalize_title(hit_artist);
    let c_title = normalize_title(&candidate.title);
    let c_producer = normalize_title(&candidate.producer_name);

    let title_score = similarity_ratio(&n_title, &c_title);
    let artist_bonus = artist_bonus(&n_artist, &c_producer, weights);
    let contains_bonus = if mutually_contained(&n_title, &c_title) {
        weights.title_contained
    } else {
        0.0
    };
    let word_bonus = word_bonus(&n_title, &c_title, weights);
    let remix_bonus = remix_bonus(&n_title, &c_title, weights);
    let exact = n_title == c_title;

    ScoreBreakdown {
        hit_title: n_title,
        candidate_title: c_title,
        title_score,
        artist_bonus,
        contains_bonus,
        word_bonus,
        remix_bonus,
        exact,
        exact_score: weights.exact_match,
    }
}

pub fn score_breakdown(hit_title: &str, hit_artist: &str, candidate: &CatalogCandidate) -> ScoreBreakdown {
    score_breakdown_with(&ScoringWeights::DEFAULT, hit_title, hit_artist, candidate)
}

/// Fuzzy score of a recognition hit against one catalog candidate.
/// Non-negative; `EXACT_MATCH_SCORE` when the normalized titles are equal.
pub fn score(hit_title: &str, hit_artist: &str, candidate: &CatalogCandidate) -> f64 {
    score_breakdown(hit_title, hit_artist, candidate).total()
}

pub fn score_with(
    weights: &ScoringWeights,
    hit_title: &str,
    hit_artist: &str,
    candidate: &CatalogCandidate,
) -> f64 {
    score_breakdown_with(weights, hit_title, hit_artist, candidate).total()
}

// ============================================================================
// Offline Scoring
// ============================================================================

/// Weighted score used when reconciling offline session recordings.
///
/// Works on lowercased raw strings (no normalization). The candidate artist
/// is `producer_name`, falling back to an `artist` field.
pub fn offline_score(hit_title: &str, hit_artist: &str, candidate: &CatalogCandidate) -> f64 {
    let candidate_artist = if candidate.producer_name.is_empty() {
        candidate.str_field("artist").unwrap_or("")
    } else {
        candidate.producer_name.as_str()
    };

    let title_ratio = similarity_ratio(&candidate.title.to_lowercase(), &hit_title.to_lowercase());
    let artist_ratio = similarity_ratio(&candidate_artist.to_lowercase(), &hit_artist.to_lowercase());

    title_ratio * OFFLINE_TITLE_WEIGHT + artist_ratio * OFFLINE_ARTIST_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, producer: &str) -> CatalogCandidate {
        CatalogCandidate::new("x", title, producer)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exact_normalized_title_scores_two() {
        let c = candidate("Midnight Drive", "Somebody Else");
        assert_eq!(score("Midnight Drive (Club Mix)", "DJ Nova", &c), 2.0);
        assert_eq!(score("MIDNIGHT DRIVE!", "", &c), 2.0);
    }

    #[test]
    fn test_exact_override_ignores_bonuses() {
        let c = candidate("Deep Blue", "Ocean");
        let b = score_breakdown("Deep Blue", "Ocean", &c);
        assert!(b.exact);
        // 1.0 title + 0.3 artist + 0.2 contains + 0.3 words
        assert!(approx(b.weighted_sum(), 1.8));
        assert_eq!(b.total(), 2.0);
    }

    #[test]
    fn test_empty_vs_empty_is_exact() {
        let c = candidate("", "");
        assert_eq!(score("", "", &c), 2.0);
        assert_eq!(score("(Intro)", "Someone", &candidate("!!!", "")), 2.0);
    }

    #[test]
    fn test_empty_candidate_title_scores_low() {
        let c = candidate("", "");
        let b = score_breakdown("Summer Nights", "Alex Ray", &c);
        assert_eq!(b.title_score, 0.0);
        assert_eq!(b.contains_bonus, 0.0);
        assert_eq!(b.total(), 0.0);
    }

    #[test]
    fn test_artist_contained_overrides_ratio() {
        // ratio("dj nova", "dj nova music") > 0.5 and contained -> 0.3
        let c = candidate("Other Title", "DJ Nova Music");
        let b = score_breakdown("Some Track", "DJ Nova", &c);
        assert_eq!(b.artist_bonus, 0.3);
    }

    #[test]
    fn test_artist_similar_but_not_contained() {
        // "dj novak" vs "dj nova x": ratio 14/17 > 0.5, neither contains the other
        let c = candidate("Other", "DJ Nova X");
        let b = score_breakdown("Song", "DJ Novak", &c);
        assert_eq!(b.artist_bonus, 0.2);
    }

    #[test]
    fn test_artist_bonus_requires_both_sides() {
        let c = candidate("Other", "");
        assert_eq!(score_breakdown("Song", "DJ Nova", &c).artist_bonus, 0.0);
        let c = candidate("Other", "DJ Nova");
        assert_eq!(score_breakdown("Song", "", &c).artist_bonus, 0.0);
    }

    #[test]
    fn test_contains_and_word_bonus() {
        let c = candidate("Midnight Drive Reloaded", "X");
        let b = score_breakdown("Midnight Drive", "Y", &c);
        assert_eq!(b.contains_bonus, 0.2);
        // 2 common words / max(2, 3) * 0.3
        assert!(approx(b.word_bonus, 0.2));
        assert!(!b.exact);
    }

    #[test]
    fn test_remix_bonus_first_long_word() {
        let c = candidate("Galaxy Remix", "X");
        let b = score_breakdown("Galaxy (VIP)", "Y", &c);
        assert_eq!(b.remix_bonus, 0.15);

        // Words of length <= 3 never trigger it
        let c = candidate("Sun Remix", "X");
        assert_eq!(score_breakdown("Sun", "Y", &c).remix_bonus, 0.0);

        // No "remix" on either side
        let c = candidate("Galaxy Dub", "X");
        assert_eq!(score_breakdown("Galaxy", "Y", &c).remix_bonus, 0.0);
    }

    #[test]
    fn test_unrelated_scores_below_threshold() {
        let c = candidate("Completely Unrelated Song", "Nobody");
        let s = score("Summer Nights", "Alex Ray", &c);
        assert!(s < ACCEPTANCE_THRESHOLD, "score {}", s);
        assert!(s >= 0.0);
    }

    #[test]
    fn test_custom_weights() {
        let weights = ScoringWeights {
            shared_words: 0.0,
            title_contained: 0.0,
            ..ScoringWeights::DEFAULT
        };
        let c = candidate("Midnight Drive Reloaded", "X");
        let b = score_breakdown_with(&weights, "Midnight Drive", "Y", &c);
        assert_eq!(b.word_bonus, 0.0);
        assert_eq!(b.contains_bonus, 0.0);
    }

    #[test]
    fn test_offline_score_weights() {
        let c = candidate("Deep Blue", "Ocean");
        assert!(approx(offline_score("DEEP BLUE", "ocean", &c), 1.0));

        let c = CatalogCandidate::new("x", "Deep Blue", "").with_field("artist", "Ocean");
        assert!(approx(offline_score("deep blue", "Ocean", &c), 1.0));

        let c = candidate("Deep Blue", "zzz");
        assert!(approx(offline_score("deep blue", "Ocean", &c), 0.7));
    }
}
