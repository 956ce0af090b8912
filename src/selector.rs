//! Candidate selection.
//!
//! Scans a candidate list, keeps the best-scoring candidate (first seen wins
//! on ties) and accepts it only if it clears the threshold.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::models::{CatalogCandidate, MatchResult, RecognitionHit};
use crate::scoring::{
    offline_score, score_with, ScoringWeights, ACCEPTANCE_THRESHOLD, LOG_CANDIDATE_THRESHOLD,
    OFFLINE_ACCEPTANCE_THRESHOLD,
};

/// Best candidate and its score; `None` if nothing scored above zero.
fn best_by<F>(candidates: &[CatalogCandidate], mut score: F) -> Option<(&CatalogCandidate, f64)>
where
    F: FnMut(&CatalogCandidate) -> f64,
{
    let mut best: Option<(&CatalogCandidate, f64)> = None;
    let mut best_score = 0.0;

    for candidate in candidates {
        let total = score(candidate);
        if total > LOG_CANDIDATE_THRESHOLD {
            debug!(title = %candidate.title, score = total, "candidate");
        }
        // Strictly greater: ties keep the earlier candidate
        if total > best_score {
            best_score = total;
            best = Some((candidate, total));
        }
    }

    best
}

/// Apply the acceptance threshold to the best candidate found.
pub fn accept(best: Option<(&CatalogCandidate, f64)>, threshold: f64) -> MatchResult {
    match best {
        Some((candidate, score)) if score >= threshold => {
            info!(title = %candidate.title, score, "fuzzy match accepted");
            MatchResult {
                candidate: Some(candidate.clone()),
                score,
            }
        }
        Some((candidate, score)) => {
            info!(title = %candidate.title, score, threshold, "best fuzzy match below threshold");
            MatchResult {
                candidate: None,
                score,
            }
        }
        None => MatchResult::no_match(),
    }
}

/// Select the catalog track matching a recognition hit.
pub fn select_best_match(
    hit_title: &str,
    hit_artist: &str,
    candidates: &[CatalogCandidate],
) -> MatchResult {
    select_best_match_with(
        &ScoringWeights::DEFAULT,
        ACCEPTANCE_THRESHOLD,
        hit_title,
        hit_artist,
        candidates,
    )
}

pub fn select_best_match_with(
    weights: &ScoringWeights,
    threshold: f64,
    hit_title: &str,
    hit_artist: &str,
    candidates: &[CatalogCandidate],
) -> MatchResult {
    if candidates.is_empty() {
        return MatchResult::no_match();
    }
    let best = best_by(candidates, |c| score_with(weights, hit_title, hit_artist, c));
    accept(best, threshold)
}

/// Offline-session variant: weighted title/artist ratio, accepted only
/// strictly above `OFFLINE_ACCEPTANCE_THRESHOLD`.
pub fn select_offline_match(
    hit_title: &str,
    hit_artist: &str,
    candidates: &[CatalogCandidate],
) -> MatchResult {
    let mut best: Option<(&CatalogCandidate, f64)> = None;
    let mut best_score = 0.0;

    for candidate in candidates {
        let combined = offline_score(hit_title, hit_artist, candidate);
        if combined > best_score && combined > OFFLINE_ACCEPTANCE_THRESHOLD {
            best_score = combined;
            best = Some((candidate, combined));
        }
    }

    match best {
        Some((candidate, score)) => MatchResult {
            candidate: Some(candidate.clone()),
            score,
        },
        None => MatchResult::no_match(),
    }
}

/// Match many hits against one candidate list in parallel. Output order
/// follows `hits`.
pub fn select_many(hits: &[RecognitionHit], candidates: &[CatalogCandidate]) -> Vec<MatchResult> {
    hits.par_iter()
        .map(|hit| select_best_match(&hit.title, &hit.artist, candidates))
        .collect()
}
