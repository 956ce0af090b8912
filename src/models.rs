//! Core data models for catalog reconciliation.
//!
//! This module contains the recognition inputs, the catalog candidate record,
//! match outputs and the enriched recognition record handed back to callers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Recognition Input
// ============================================================================

/// Raw (title, artist) pair produced by the fingerprinting service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionHit {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artist: String,
}

impl RecognitionHit {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Track record from the Spynners catalog.
///
/// Only `id`, `title` and `producer_name` take part in scoring. Every other
/// field the catalog returns is kept in `extra` and serialized back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogCandidate {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub producer_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogCandidate {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        producer_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            producer_name: producer_name.into(),
            extra: Map::new(),
        }
    }

    /// Builder-style helper used by catalogs and tests to attach metadata.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Non-empty string value of an extra field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }

    pub fn producer_id(&self) -> Option<&str> {
        self.str_field("producer_id")
    }

    pub fn artwork_url(&self) -> Option<&str> {
        self.str_field("artwork_url")
    }

    pub fn genre(&self) -> Option<&str> {
        self.str_field("genre")
    }

    pub fn acrcloud_id(&self) -> Option<&str> {
        self.str_field("acrcloud_id")
    }
}

/// Deserialize `null` into the type's default (Base44 sends explicit nulls).
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Match Output
// ============================================================================

/// Output of candidate selection.
///
/// `candidate` is `None` when the list was empty or the best score fell below
/// the acceptance threshold. The best score is reported either way.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub candidate: Option<CatalogCandidate>,
    pub score: f64,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            candidate: None,
            score: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.candidate.is_some()
    }

    pub fn candidate_id(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.id.as_str())
    }
}

/// How a recognition was linked to a catalog track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// ACRCloud matched one of the uploaded Spynners files directly
    CustomFile,
    /// Catalog track already carried the recognized ACRCloud id
    AcrcloudId,
    /// Multi-signal fuzzy title match
    FuzzyTitle,
    /// Weighted title/artist match used for offline sessions
    OfflineFuzzy,
    Unmatched,
}

// ============================================================================
// Output Models
// ============================================================================

/// Final recognition record returned to the caller.
///
/// Display fields (`title`, `artist`, `album`, ...) come from the catalog
/// track when one was linked, and from ACRCloud otherwise.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub success: bool,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_image: Option<String>,
    pub genre: String,
    pub genres: Vec<String>,
    pub release_date: String,
    pub label: String,
    pub duration_ms: i64,
    pub score: f64,
    pub bpm: Option<Value>,
    pub energy_level: Option<Value>,
    pub mood: Option<Value>,
    pub spynners_track_id: Option<String>,
    pub producer_id: Option<String>,
    pub producer_email: Option<String>,
    pub acrcloud_id: String,
    pub isrc: Option<String>,
    pub play_offset_ms: i64,
    pub is_spynners_track: bool,
    pub matched_by: Option<MatchSource>,
    /// Fuzzy score when the link came from the scorer
    pub match_score: Option<f64>,
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for batch runs, written as JSON like the extraction stats.
#[derive(Default, Debug, Clone, Serialize)]
pub struct MatchingStats {
    pub recordings: usize,
    pub recognized: usize,
    pub not_recognized: usize,
    pub errors: usize,

    pub custom_file_matches: usize,
    pub acrcloud_id_matches: usize,
    pub fuzzy_matches: usize,
    pub unmatched: usize,

    pub elapsed_seconds: f64,
}

impl MatchingStats {
    /// Share of recordings linked to a catalog track, as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.recordings == 0 {
            0.0
        } else {
            100.0 * self.linked() as f64 / self.recordings as f64
        }
    }

    pub fn linked(&self) -> usize {
        self.custom_file_matches + self.acrcloud_id_matches + self.fuzzy_matches
    }

    pub fn record(&mut self, source: Option<MatchSource>) {
        match source {
            Some(MatchSource::CustomFile) => self.custom_file_matches += 1,
            Some(MatchSource::AcrcloudId) => self.acrcloud_id_matches += 1,
            Some(MatchSource::FuzzyTitle) | Some(MatchSource::OfflineFuzzy) => {
                self.fuzzy_matches += 1
            }
            Some(MatchSource::Unmatched) | None => self.unmatched += 1,
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!(target: "stats", "[STATS:{}]\n{}", phase, json);
        }
    }

    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_null_fields_decode_as_empty() {
        let json = r#"{"id": "t1", "title": null, "producer_name": null, "genre": "House"}"#;
        let c: CatalogCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.title, "");
        assert_eq!(c.producer_name, "");
        assert_eq!(c.genre(), Some("House"));
    }

    #[test]
    fn test_candidate_extra_fields_survive_roundtrip() {
        let json = r#"{"id":"t1","title":"A","producer_name":"B","artwork_url":"http://x/a.jpg","bpm":124}"#;
        let c: CatalogCandidate = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&c).unwrap();
        assert_eq!(back["artwork_url"], "http://x/a.jpg");
        assert_eq!(back["bpm"], 124);
    }

    #[test]
    fn test_empty_string_fields_are_absent() {
        let c = CatalogCandidate::new("1", "T", "P").with_field("acrcloud_id", "");
        assert_eq!(c.acrcloud_id(), None);
    }

    #[test]
    fn test_stats_match_rate() {
        let mut stats = MatchingStats {
            recordings: 4,
            ..Default::default()
        };
        stats.record(Some(MatchSource::FuzzyTitle));
        stats.record(Some(MatchSource::CustomFile));
        stats.record(None);
        assert_eq!(stats.linked(), 2);
        assert_eq!(stats.unmatched, 1);
        assert!((stats.match_rate() - 50.0).abs() < 1e-9);
    }
}
