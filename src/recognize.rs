//! Recognition pipeline: identify a sample, then tie the hit to the Spynners
//! catalog.
//!
//! Lookup order for a recognized track:
//! 1. ACRCloud custom file (a Spynners upload) -> track id carried in the hit
//! 2. Catalog track already tagged with the ACRCloud id
//! 3. Fuzzy title match over the first `candidate_limit` catalog tracks
//!
//! Catalog failures never fail the recognition; the result just stays
//! unlinked and carries ACRCloud metadata only.

use tracing::{info, warn};

use crate::acrcloud::{AcrCustomFile, AcrMusic, IdentifyResponse, RecognizedTrack, Recognizer};
use crate::catalog::{TrackCatalog, DEFAULT_CANDIDATE_LIMIT};
use crate::error::Result;
use crate::models::{CatalogCandidate, MatchSource, RecognitionResult};
use crate::scoring::{ScoringWeights, ACCEPTANCE_THRESHOLD};
use crate::selector::select_best_match_with;
use crate::transcode::prepare_sample;

pub struct Reconciler<'a> {
    catalog: &'a dyn TrackCatalog,
    weights: ScoringWeights,
    threshold: f64,
    candidate_limit: usize,
}

/// Catalog track linked to a hit, and how it was found.
struct Link {
    track: CatalogCandidate,
    source: MatchSource,
    score: Option<f64>,
}

impl<'a> Reconciler<'a> {
    pub fn new(catalog: &'a dyn TrackCatalog) -> Self {
        Self {
            catalog,
            weights: ScoringWeights::DEFAULT,
            threshold: ACCEPTANCE_THRESHOLD,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights, threshold: f64) -> Self {
        self.weights = weights;
        self.threshold = threshold;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Sniff, convert if needed, identify and reconcile one sample.
    ///
    /// `Ok(None)` means ACRCloud did not recognize the audio.
    pub fn recognize_audio(
        &self,
        recognizer: &dyn Recognizer,
        audio: Vec<u8>,
    ) -> Result<Option<RecognitionResult>> {
        let (sample, format) = prepare_sample(audio);
        let response = recognizer.identify(&sample, format)?;
        if !response.is_success() {
            info!(code = response.status.code, msg = %response.status.msg, "track not identified");
        }
        Ok(self.reconcile(&response))
    }

    /// Build the enriched record for an identify response.
    pub fn reconcile(&self, response: &IdentifyResponse) -> Option<RecognitionResult> {
        let track = response.best_track()?;
        info!(
            title = track.title(),
            artist = %track.artist(),
            origin = ?track.origin(),
            acrid = track.acrid(),
            "recognized"
        );

        Some(match track {
            RecognizedTrack::Custom(custom) => self.from_custom_file(&track, custom),
            RecognizedTrack::Music(music, _) => self.from_music(response, &track, music),
        })
    }

    // ------------------------------------------------------------------------
    // Custom files
    // ------------------------------------------------------------------------

    fn from_custom_file(&self, track: &RecognizedTrack<'_>, custom: &AcrCustomFile) -> RecognitionResult {
        let spynners_track_id = custom.spynners_track_id.clone().filter(|id| !id.is_empty());

        let details = spynners_track_id
            .as_deref()
            .and_then(|id| match self.catalog.get_track(id) {
                Ok(details) => details,
                Err(e) => {
                    warn!(track_id = id, error = %e, "could not fetch track details");
                    None
                }
            });

        let producer_id = details
            .as_ref()
            .and_then(|d| d.producer_id())
            .map(str::to_string)
            .or_else(|| custom.producer_id.clone().filter(|id| !id.is_empty()));
        let cover_image = custom
            .artwork_url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| details.as_ref().and_then(|d| d.artwork_url()).map(str::to_string));
        let genre = track
            .genre()
            .or_else(|| details.as_ref().and_then(|d| d.genre()))
            .unwrap_or_default()
            .to_string();
        let producer_email = producer_id.as_deref().and_then(|id| self.lookup_email(id));

        info!(?spynners_track_id, ?producer_id, "direct match from custom file");

        RecognitionResult {
            success: true,
            title: track.title().to_string(),
            artist: track.artist(),
            album: custom.album.clone(),
            cover_image,
            genres: genre_list(&genre),
            genre,
            release_date: custom.release_date.clone(),
            label: custom.label.clone(),
            duration_ms: custom.duration_ms,
            score: custom.score.unwrap_or(0.0),
            bpm: custom.bpm.clone(),
            spynners_track_id,
            producer_id,
            producer_email,
            acrcloud_id: custom.acrid.clone(),
            play_offset_ms: custom.play_offset_ms,
            is_spynners_track: true,
            matched_by: Some(MatchSource::CustomFile),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Music / humming
    // ------------------------------------------------------------------------

    fn from_music(
        &self,
        response: &IdentifyResponse,
        track: &RecognizedTrack<'_>,
        music: &AcrMusic,
    ) -> RecognitionResult {
        let acrid = track.acrid();
        let link = self.find_link(track);

        if let Some(link) = &link {
            if !acrid.is_empty() && link.track.acrcloud_id().is_none() {
                match self.catalog.set_acrcloud_id(&link.track.id, acrid) {
                    Ok(()) => info!(track_id = %link.track.id, acrid, "acrcloud_id backfilled"),
                    Err(e) => warn!(track_id = %link.track.id, error = %e, "acrcloud_id backfill failed"),
                }
            }
        } else {
            info!(title = track.title(), artist = %track.artist(), "track not found in catalog");
        }

        let linked = link.as_ref().map(|l| &l.track);
        let producer_id = linked.and_then(|t| t.producer_id()).map(str::to_string);
        let producer_email = producer_id.as_deref().and_then(|id| self.lookup_email(id));
        let genre = linked
            .and_then(|t| t.genre())
            .or_else(|| track.genre())
            .unwrap_or_default()
            .to_string();
        let from_track = |key: &str| linked.and_then(|t| t.str_field(key)).map(str::to_string);

        let title = linked
            .map(|t| t.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| track.title())
            .to_string();
        let artist = linked
            .map(|t| t.producer_name.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| track.artist());
        let album = match linked {
            Some(_) => from_track("album").unwrap_or_default(),
            None => music.album.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
        };
        let release_date = match linked {
            Some(_) => from_track("release_date").unwrap_or_default(),
            None => music.release_date.clone(),
        };
        let label = match linked {
            Some(_) => from_track("label").unwrap_or_default(),
            None => music.label.clone(),
        };

        RecognitionResult {
            success: true,
            title,
            artist,
            album,
            cover_image: linked.and_then(|t| t.artwork_url()).map(str::to_string),
            genres: genre_list(&genre),
            genre,
            release_date,
            label,
            duration_ms: music.duration_ms,
            score: music.score.unwrap_or(0.0),
            bpm: linked.and_then(|t| t.field("bpm")).cloned(),
            energy_level: linked.and_then(|t| t.field("energy_level")).cloned(),
            mood: linked.and_then(|t| t.field("mood")).cloned(),
            spynners_track_id: linked.map(|t| t.id.clone()),
            producer_id,
            producer_email,
            acrcloud_id: acrid.to_string(),
            isrc: from_track("isrc"),
            play_offset_ms: response.play_offset_ms(),
            is_spynners_track: linked.is_some(),
            matched_by: Some(link.as_ref().map_or(MatchSource::Unmatched, |l| l.source)),
            match_score: link.as_ref().and_then(|l| l.score),
            ..Default::default()
        }
    }

    fn find_link(&self, track: &RecognizedTrack<'_>) -> Option<Link> {
        let acrid = track.acrid();
        if !acrid.is_empty() {
            match self.catalog.find_by_acrcloud_id(acrid) {
                Ok(Some(found)) => {
                    info!(title = %found.title, "found track by acrcloud_id");
                    return Some(Link {
                        track: found,
                        source: MatchSource::AcrcloudId,
                        score: None,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(acrid, error = %e, "acrcloud_id lookup failed"),
            }
        }

        let candidates = match self.catalog.list_tracks(self.candidate_limit, None) {
            // Untitled tracks would all tie on an empty normalized hit title
            Ok(mut candidates) => {
                candidates.retain(|c| !c.title.is_empty());
                candidates
            }
            Err(e) => {
                warn!(error = %e, "could not list catalog tracks");
                return None;
            }
        };
        info!(count = candidates.len(), "fuzzy matching against catalog");

        let hit = track.hit();
        let result = select_best_match_with(
            &self.weights,
            self.threshold,
            &hit.title,
            &hit.artist,
            &candidates,
        );
        let score = result.score;
        result.candidate.map(|track| Link {
            track,
            source: MatchSource::FuzzyTitle,
            score: Some(score),
        })
    }

    fn lookup_email(&self, producer_id: &str) -> Option<String> {
        match self.catalog.producer_email(producer_id) {
            Ok(email) => email,
            Err(e) => {
                warn!(producer_id, error = %e, "could not get producer email");
                None
            }
        }
    }
}

fn genre_list(genre: &str) -> Vec<String> {
    if genre.is_empty() {
        Vec::new()
    } else {
        vec![genre.to_string()]
    }
}
