//! ACRCloud identification: request signing, audio sniffing, response model
//! and the HTTP client.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::blocking::{multipart, Client};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha1::Sha1;
use tracing::{debug, info};

use crate::config::AcrCloudConfig;
use crate::error::{Error, Result};
use crate::models::{null_as_empty, RecognitionHit};

pub const IDENTIFY_URI: &str = "/v1/identify";
pub const DATA_TYPE: &str = "audio";
pub const SIGNATURE_VERSION: &str = "1";

const UNKNOWN: &str = "Unknown";

type HmacSha1 = Hmac<Sha1>;

// ============================================================================
// Request Signing
// ============================================================================

/// Base64 HMAC-SHA1 signature over the newline-joined request fields.
pub fn sign(
    http_method: &str,
    http_uri: &str,
    access_key: &str,
    data_type: &str,
    signature_version: &str,
    timestamp: &str,
    access_secret: &str,
) -> Result<String> {
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        http_method, http_uri, access_key, data_type, signature_version, timestamp
    );
    let mut mac = HmacSha1::new_from_slice(access_secret.as_bytes())
        .map_err(|e| Error::Config(format!("invalid ACRCloud secret: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// Audio Format Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Webm,
    M4a,
    Mp3,
    Ogg,
}

impl AudioFormat {
    /// Detect the container from magic bytes. Unknown data is sent as WAV.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(b"RIFF") {
            AudioFormat::Wav
        } else if data.starts_with(b"\x1aE\xdf\xa3") {
            AudioFormat::Webm
        } else if data.starts_with(b"ftyp") || data.get(4..8) == Some(b"ftyp".as_slice()) {
            AudioFormat::M4a
        } else if data.starts_with(b"ID3") || data.starts_with(b"\xff\xfb") {
            AudioFormat::Mp3
        } else if data.starts_with(b"OggS") {
            AudioFormat::Ogg
        } else {
            AudioFormat::Wav
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ogg => "audio/ogg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
        }
    }

    /// Containers that fingerprint better after conversion to WAV
    pub fn needs_conversion(self) -> bool {
        matches!(self, AudioFormat::Webm | AudioFormat::M4a | AudioFormat::Ogg)
    }
}

// ============================================================================
// Response Model
// ============================================================================

/// Integer fields that sometimes arrive as floats or null
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcrStatus {
    #[serde(default = "AcrStatus::unknown_code")]
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub msg: String,
}

impl AcrStatus {
    fn unknown_code() -> i64 {
        -1
    }
}

impl Default for AcrStatus {
    fn default() -> Self {
        Self {
            code: Self::unknown_code(),
            msg: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcrName {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

/// Entry of `metadata.music` / `metadata.humming`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcrMusic {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub acrid: String,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artists: Vec<AcrName>,
    /// Flat artist string some entries carry instead of `artists`
    pub artist: Option<String>,
    pub album: Option<AcrName>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genres: Vec<AcrName>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration_ms: i64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub release_date: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
}

/// Entry of `metadata.custom_files`: a Spynners upload registered in ACRCloud
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcrCustomFile {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub acrid: String,
    pub title: Option<String>,
    pub producer_name: Option<String>,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
    pub spynners_track_id: Option<String>,
    pub producer_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genre: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub album: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub release_date: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration_ms: i64,
    #[serde(default)]
    pub score: Option<f64>,
    pub bpm: Option<Value>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub play_offset_ms: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcrMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub custom_files: Vec<AcrCustomFile>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub music: Vec<AcrMusic>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub humming: Vec<AcrMusic>,
    #[serde(default)]
    pub played_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdentifyResponse {
    #[serde(default)]
    pub status: AcrStatus,
    #[serde(default)]
    pub metadata: AcrMetadata,
}

/// Where in the response the chosen track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOrigin {
    CustomFiles,
    Music,
    Humming,
}

#[derive(Debug, Clone, Copy)]
pub enum RecognizedTrack<'a> {
    Custom(&'a AcrCustomFile),
    Music(&'a AcrMusic, TrackOrigin),
}

impl IdentifyResponse {
    pub fn is_success(&self) -> bool {
        self.status.code == 0
    }

    /// First custom file, else first music entry, else first humming entry.
    pub fn best_track(&self) -> Option<RecognizedTrack<'_>> {
        if !self.is_success() {
            return None;
        }
        let metadata = &self.metadata;
        if let Some(custom) = metadata.custom_files.first() {
            Some(RecognizedTrack::Custom(custom))
        } else if let Some(music) = metadata.music.first() {
            Some(RecognizedTrack::Music(music, TrackOrigin::Music))
        } else {
            metadata
                .humming
                .first()
                .map(|m| RecognizedTrack::Music(m, TrackOrigin::Humming))
        }
    }

    /// `metadata.played_duration` (seconds) as milliseconds
    pub fn play_offset_ms(&self) -> i64 {
        self.metadata
            .played_duration
            .map(|secs| (secs * 1000.0) as i64)
            .unwrap_or(0)
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl<'a> RecognizedTrack<'a> {
    pub fn origin(&self) -> TrackOrigin {
        match self {
            RecognizedTrack::Custom(_) => TrackOrigin::CustomFiles,
            RecognizedTrack::Music(_, origin) => *origin,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, RecognizedTrack::Custom(_))
    }

    pub fn acrid(&self) -> &'a str {
        match self {
            RecognizedTrack::Custom(c) => &c.acrid,
            RecognizedTrack::Music(m, _) => &m.acrid,
        }
    }

    pub fn title(&self) -> &'a str {
        let title = match self {
            RecognizedTrack::Custom(c) => non_empty(&c.title),
            RecognizedTrack::Music(m, _) => non_empty(&m.title),
        };
        title.unwrap_or(UNKNOWN)
    }

    /// Custom files credit `producer_name`; music entries join all artists.
    pub fn artist(&self) -> String {
        match self {
            RecognizedTrack::Custom(c) => non_empty(&c.producer_name)
                .or_else(|| non_empty(&c.artist))
                .unwrap_or(UNKNOWN)
                .to_string(),
            RecognizedTrack::Music(m, _) => {
                let joined = m
                    .artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                if !joined.is_empty() {
                    joined
                } else {
                    non_empty(&m.artist).unwrap_or(UNKNOWN).to_string()
                }
            }
        }
    }

    pub fn hit(&self) -> RecognitionHit {
        RecognitionHit::new(self.title(), self.artist())
    }

    /// First ACRCloud genre name, used when the catalog has none
    pub fn genre(&self) -> Option<&'a str> {
        match self {
            RecognizedTrack::Custom(c) => Some(c.genre.as_str()).filter(|g| !g.is_empty()),
            RecognizedTrack::Music(m, _) => m
                .genres
                .first()
                .map(|g| g.name.as_str())
                .filter(|g| !g.is_empty()),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Anything that can turn an audio sample into an identify response.
pub trait Recognizer: Send + Sync {
    fn identify(&self, audio: &[u8], format: AudioFormat) -> Result<IdentifyResponse>;
}

pub struct AcrCloudClient {
    config: AcrCloudConfig,
    http: Client,
}

impl AcrCloudClient {
    pub fn new(config: AcrCloudConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }
}

impl Recognizer for AcrCloudClient {
    fn identify(&self, audio: &[u8], format: AudioFormat) -> Result<IdentifyResponse> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            "POST",
            IDENTIFY_URI,
            &self.config.access_key,
            DATA_TYPE,
            SIGNATURE_VERSION,
            &timestamp,
            &self.config.access_secret,
        )?;

        let sample = multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.mime())?;
        let form = multipart::Form::new()
            .text("access_key", self.config.access_key.clone())
            .text("sample_bytes", audio.len().to_string())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .part("sample", sample);

        info!(bytes = audio.len(), mime = format.mime(), "sending sample to ACRCloud");
        let response = self
            .http
            .post(self.config.identify_url())
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream {
                service: "ACRCloud",
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let body: IdentifyResponse = response.json()?;
        debug!(code = body.status.code, msg = %body.status.msg, "ACRCloud status");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_matches_known_vector() {
        let sig = sign("POST", IDENTIFY_URI, "my_key", DATA_TYPE, SIGNATURE_VERSION, "1700000000", "my_secret")
            .unwrap();
        assert_eq!(sig, "vCFGKJZq2YySJrsB+EWNC3lJj7Q=");
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(AudioFormat::sniff(b"RIFF\x00\x00\x00\x00WAVE"), AudioFormat::Wav);
        assert_eq!(AudioFormat::sniff(b"\x1aE\xdf\xa3\x01\x02"), AudioFormat::Webm);
        assert_eq!(AudioFormat::sniff(b"\x00\x00\x00\x20ftypM4A "), AudioFormat::M4a);
        assert_eq!(AudioFormat::sniff(b"ID3\x04\x00"), AudioFormat::Mp3);
        assert_eq!(AudioFormat::sniff(b"\xff\xfb\x90\x00"), AudioFormat::Mp3);
        assert_eq!(AudioFormat::sniff(b"OggS\x00\x02"), AudioFormat::Ogg);
        assert_eq!(AudioFormat::sniff(b"??"), AudioFormat::Wav);
        assert_eq!(AudioFormat::sniff(b""), AudioFormat::Wav);
    }

    #[test]
    fn test_conversion_formats() {
        assert!(AudioFormat::Webm.needs_conversion());
        assert!(AudioFormat::M4a.needs_conversion());
        assert!(AudioFormat::Ogg.needs_conversion());
        assert!(!AudioFormat::Wav.needs_conversion());
        assert!(!AudioFormat::Mp3.needs_conversion());
    }

    #[test]
    fn test_custom_files_take_precedence() {
        let json = r#"{
            "status": {"code": 0, "msg": "Success"},
            "metadata": {
                "custom_files": [{"acrid": "c1", "title": "Midnight Drive", "producer_name": "DJ Nova",
                                  "spynners_track_id": "t42", "duration_ms": 1000.0}],
                "music": [{"acrid": "m1", "title": "Other", "artists": [{"name": "X"}]}],
                "played_duration": 12
            }
        }"#;
        let response: IdentifyResponse = serde_json::from_str(json).unwrap();
        let track = response.best_track().unwrap();
        assert!(track.is_custom());
        assert_eq!(track.origin(), TrackOrigin::CustomFiles);
        assert_eq!(track.acrid(), "c1");
        assert_eq!(track.hit(), RecognitionHit::new("Midnight Drive", "DJ Nova"));
        assert_eq!(response.play_offset_ms(), 12_000);
    }

    #[test]
    fn test_music_artists_joined() {
        let json = r#"{
            "status": {"code": 0, "msg": "Success"},
            "metadata": {"music": [{"acrid": "m1", "title": "Sunset Groove",
                                     "artists": [{"name": "A"}, {"name": ""}, {"name": "B"}],
                                     "genres": [{"name": "House"}]}]}
        }"#;
        let response: IdentifyResponse = serde_json::from_str(json).unwrap();
        let track = response.best_track().unwrap();
        assert_eq!(track.origin(), TrackOrigin::Music);
        assert_eq!(track.artist(), "A, B");
        assert_eq!(track.genre(), Some("House"));
    }

    #[test]
    fn test_humming_and_unknown_fallbacks() {
        let json = r#"{"status": {"code": 0}, "metadata": {"humming": [{"title": null, "artists": null}]}}"#;
        let response: IdentifyResponse = serde_json::from_str(json).unwrap();
        let track = response.best_track().unwrap();
        assert_eq!(track.origin(), TrackOrigin::Humming);
        assert_eq!(track.title(), "Unknown");
        assert_eq!(track.artist(), "Unknown");
    }

    #[test]
    fn test_no_result_status() {
        let json = r#"{"status": {"code": 1001, "msg": "No result"}}"#;
        let response: IdentifyResponse = serde_json::from_str(json).unwrap();
        assert!(!response.is_success());
        assert!(response.best_track().is_none());

        let empty: IdentifyResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.status.code, -1);
    }
}
