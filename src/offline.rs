//! Offline SPYN sessions.
//!
//! A device records samples while offline and uploads them in one batch when
//! it reconnects. Each recording is identified independently; hits that are
//! not Spynners uploads are matched against one approved-track snapshot with
//! the weighted title/artist scorer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::acrcloud::{RecognizedTrack, Recognizer, TrackOrigin};
use crate::catalog::{TrackCatalog, APPROVED_STATUS, DEFAULT_CANDIDATE_LIMIT};
use crate::error::Result;
use crate::models::{CatalogCandidate, MatchSource, MatchingStats};
use crate::progress::{create_progress_bar, log_progress};
use crate::selector::select_offline_match;
use crate::transcode::prepare_sample;

// ============================================================================
// Session Input
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRecording {
    pub audio_base64: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub location: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSession {
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub dj_name: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Venue info (`city`, `country`, `venue`, `is_valid_venue`)
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub recordings: Vec<OfflineRecording>,
}

impl OfflineSession {
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Outcome for one recording, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingOutcome {
    pub success: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub cover_image: Option<String>,
    pub spynners_track_id: Option<String>,
    pub producer_id: Option<String>,
    pub is_spynners_track: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TrackOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

impl RecordingOutcome {
    fn failed(timestamp: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: timestamp.to_string(),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSessionReport {
    pub session_id: String,
    pub user_id: String,
    pub dj_name: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub location: Option<Value>,
    pub recordings_count: usize,
    /// Recordings linked to a Spynners track
    pub identified_count: usize,
    pub results: Vec<RecordingOutcome>,
    pub processed_at: String,
}

impl OfflineSessionReport {
    pub fn identified(&self) -> impl Iterator<Item = &RecordingOutcome> {
        self.results.iter().filter(|r| r.is_spynners_track)
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Identify every recording of `session` and link hits to the catalog.
///
/// Per-recording failures (bad base64, upstream errors) are reported in the
/// outcome list; the session itself always completes.
pub fn process_session(
    session: &OfflineSession,
    recognizer: &dyn Recognizer,
    catalog: &dyn TrackCatalog,
) -> (OfflineSessionReport, MatchingStats) {
    let start = Instant::now();
    let total = session.recordings.len() as u64;
    info!(session_id = %session.session_id, recordings = total, "processing offline session");

    let candidates = match catalog.list_tracks(DEFAULT_CANDIDATE_LIMIT, Some(APPROVED_STATUS)) {
        Ok(tracks) => tracks,
        Err(e) => {
            warn!(error = %e, "could not fetch approved tracks, catalog matching disabled");
            Vec::new()
        }
    };

    let pb = create_progress_bar(total, "Identifying recordings");
    let done = AtomicU64::new(0);

    let tallied: Vec<(RecordingOutcome, Tally)> = session
        .recordings
        .par_iter()
        .map(|recording| {
            let tallied = match identify_recording(recording, recognizer, &candidates) {
                Ok(Identification::Recognized(outcome)) => (outcome, Tally::Recognized),
                Ok(Identification::NotRecognized(msg)) => {
                    info!(timestamp = %recording.timestamp, msg = %msg, "not identified");
                    (RecordingOutcome::failed(&recording.timestamp, msg), Tally::NotRecognized)
                }
                Err(e) => {
                    warn!(timestamp = %recording.timestamp, error = %e, "recording failed");
                    (RecordingOutcome::failed(&recording.timestamp, e.to_string()), Tally::Error)
                }
            };
            pb.inc(1);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            log_progress("offline", current, total, 10);
            tallied
        })
        .collect();
    pb.finish_and_clear();

    let mut stats = MatchingStats {
        recordings: tallied.len(),
        ..Default::default()
    };
    for (outcome, tally) in &tallied {
        match tally {
            Tally::Recognized => {
                stats.recognized += 1;
                stats.record(outcome.matched_by);
            }
            Tally::NotRecognized => stats.not_recognized += 1,
            Tally::Error => stats.errors += 1,
        }
    }
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    let results: Vec<RecordingOutcome> = tallied.into_iter().map(|(outcome, _)| outcome).collect();

    let identified_count = results.iter().filter(|r| r.is_spynners_track).count();
    info!(
        session_id = %session.session_id,
        recordings = results.len(),
        identified = identified_count,
        "offline session processed"
    );

    let report = OfflineSessionReport {
        session_id: session.session_id.clone(),
        user_id: session.user_id.clone(),
        dj_name: session.dj_name.clone(),
        start_time: session.start_time.clone(),
        end_time: session.end_time.clone(),
        location: session.location.clone(),
        recordings_count: session.recordings.len(),
        identified_count,
        results,
        processed_at: chrono::Utc::now().to_rfc3339(),
    };
    (report, stats)
}

enum Tally {
    Recognized,
    NotRecognized,
    Error,
}

enum Identification {
    Recognized(RecordingOutcome),
    NotRecognized(String),
}

fn identify_recording(
    recording: &OfflineRecording,
    recognizer: &dyn Recognizer,
    candidates: &[CatalogCandidate],
) -> Result<Identification> {
    let audio = STANDARD.decode(recording.audio_base64.trim())?;
    let (sample, format) = prepare_sample(audio);
    let response = recognizer.identify(&sample, format)?;

    if !response.is_success() {
        let msg = if response.status.msg.is_empty() {
            "Recognition failed".to_string()
        } else {
            response.status.msg.clone()
        };
        return Ok(Identification::NotRecognized(msg));
    }
    let Some(track) = response.best_track() else {
        return Ok(Identification::NotRecognized("No track in response".into()));
    };

    let hit = track.hit();
    let mut outcome = RecordingOutcome {
        success: true,
        timestamp: recording.timestamp.clone(),
        source: Some(track.origin()),
        ..Default::default()
    };

    match track {
        RecognizedTrack::Custom(custom) => {
            outcome.spynners_track_id = custom.spynners_track_id.clone().filter(|id| !id.is_empty());
            outcome.producer_id = custom.producer_id.clone().filter(|id| !id.is_empty());
            outcome.cover_image = custom.artwork_url.clone().filter(|url| !url.is_empty());
            outcome.matched_by = Some(if outcome.spynners_track_id.is_some() {
                MatchSource::CustomFile
            } else {
                MatchSource::Unmatched
            });
        }
        RecognizedTrack::Music(..) => {
            let result = select_offline_match(&hit.title, &hit.artist, candidates);
            match result.candidate {
                Some(matched) => {
                    info!(title = %matched.title, score = result.score, "matched to catalog track");
                    outcome.producer_id = matched.producer_id().map(str::to_string);
                    outcome.cover_image = matched.artwork_url().map(str::to_string);
                    outcome.spynners_track_id = Some(matched.id).filter(|id| !id.is_empty());
                    outcome.matched_by = Some(MatchSource::OfflineFuzzy);
                    outcome.match_score = Some(result.score);
                }
                None => {
                    info!(title = %hit.title, artist = %hit.artist, "no catalog match");
                    outcome.matched_by = Some(MatchSource::Unmatched);
                }
            }
        }
    }

    outcome.is_spynners_track = outcome.spynners_track_id.is_some();
    outcome.title = Some(hit.title);
    outcome.artist = Some(hit.artist);
    Ok(Identification::Recognized(outcome))
}
