//! Spynners track reconciliation library - shared modules for all binaries.
//!
//! The matching core (`normalize`, `similarity`, `scoring`, `selector`) is
//! pure and infallible. The remaining modules wire it to ACRCloud, the
//! Spynners catalog and local history.

pub mod acrcloud;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod normalize;
pub mod offline;
pub mod progress;
pub mod recognize;
pub mod scoring;
pub mod selector;
pub mod similarity;
pub mod transcode;

pub use error::{Error, Result};
pub use models::{CatalogCandidate, MatchResult, RecognitionHit, RecognitionResult};
pub use normalize::normalize_title;
pub use scoring::{score, ScoringWeights, ACCEPTANCE_THRESHOLD};
pub use selector::select_best_match;
pub use similarity::similarity_ratio;
