//! Spynners track catalog access.
//!
//! `TrackCatalog` is the seam between the recognition pipeline and wherever
//! the tracks live: the Base44 entities API in production, a JSON export for
//! local runs and tests.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Base44Config;
use crate::error::{Error, Result};
use crate::models::CatalogCandidate;

/// Tracks fetched for one fuzzy-matching pass
pub const DEFAULT_CANDIDATE_LIMIT: usize = 500;
pub const APPROVED_STATUS: &str = "approved";

const APP_ID_HEADER: &str = "X-Base44-App-Id";

pub trait TrackCatalog: Send + Sync {
    /// Full track record; `None` if the id is unknown.
    fn get_track(&self, id: &str) -> Result<Option<CatalogCandidate>>;

    /// First track whose `acrcloud_id` equals `acrcloud_id`.
    fn find_by_acrcloud_id(&self, acrcloud_id: &str) -> Result<Option<CatalogCandidate>>;

    /// Up to `limit` tracks, optionally restricted to a moderation status.
    fn list_tracks(&self, limit: usize, status: Option<&str>) -> Result<Vec<CatalogCandidate>>;

    /// Email of the producer user, if the user exists and has one.
    fn producer_email(&self, producer_id: &str) -> Result<Option<String>>;

    /// Record the recognized ACRCloud id on a track.
    fn set_acrcloud_id(&self, track_id: &str, acrcloud_id: &str) -> Result<()>;
}

// ============================================================================
// Base44
// ============================================================================

pub struct Base44Catalog {
    config: Base44Config,
    http: Client,
}

impl Base44Catalog {
    pub fn new(config: Base44Config) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn with_app_id(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(APP_ID_HEADER, &self.config.app_id)
    }

    /// Record at `entity/id`; 404 maps to `None`.
    fn get_entity<T: DeserializeOwned>(&self, entity: &str, id: &str) -> Result<Option<T>> {
        let url = format!("{}/{}", self.config.entity_url(entity), id);
        let response = self.with_app_id(self.http.get(&url)).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response)?.json()?))
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Upstream {
            service: "Base44",
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

impl TrackCatalog for Base44Catalog {
    fn get_track(&self, id: &str) -> Result<Option<CatalogCandidate>> {
        self.get_entity("Track", id)
    }

    fn find_by_acrcloud_id(&self, acrcloud_id: &str) -> Result<Option<CatalogCandidate>> {
        let response = self
            .with_app_id(self.http.get(self.config.entity_url("Track")))
            .query(&[("acrcloud_id", acrcloud_id), ("limit", "1")])
            .send()?;
        let tracks: Vec<CatalogCandidate> = check(response)?.json()?;
        Ok(tracks.into_iter().next())
    }

    fn list_tracks(&self, limit: usize, status: Option<&str>) -> Result<Vec<CatalogCandidate>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(status) = status {
            params.push(("status", status.to_string()));
        }
        let response = self
            .with_app_id(self.http.get(self.config.entity_url("Track")))
            .query(&params)
            .send()?;
        let tracks: Vec<CatalogCandidate> = check(response)?.json()?;
        info!(count = tracks.len(), "fetched catalog tracks");
        Ok(tracks)
    }

    fn producer_email(&self, producer_id: &str) -> Result<Option<String>> {
        let user: Option<Value> = self.get_entity("User", producer_id)?;
        Ok(user.as_ref().and_then(email_of))
    }

    fn set_acrcloud_id(&self, track_id: &str, acrcloud_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.config.entity_url("Track"), track_id);
        let response = self
            .with_app_id(self.http.put(&url))
            .json(&json!({ "acrcloud_id": acrcloud_id }))
            .send()?;
        check(response)?;
        debug!(track_id, acrcloud_id, "acrcloud_id backfilled");
        Ok(())
    }
}

fn email_of(user: &Value) -> Option<String> {
    user.get("email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

// ============================================================================
// JSON export
// ============================================================================

/// Catalog held in memory, loaded from a Base44 export.
///
/// The file is either an array of tracks or an object with `tracks` and an
/// optional `users` array (`[{"id": ..., "email": ...}]`).
#[derive(Default)]
pub struct JsonCatalog {
    tracks: RwLock<Vec<CatalogCandidate>>,
    users: Vec<Value>,
}

impl JsonCatalog {
    pub fn new(tracks: Vec<CatalogCandidate>) -> Self {
        Self {
            tracks: RwLock::new(tracks),
            users: Vec::new(),
        }
    }

    pub fn with_users(mut self, users: Vec<Value>) -> Self {
        self.users = users;
        self
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(data)?;
        match value {
            Value::Array(_) => Ok(Self::new(serde_json::from_value(value)?)),
            Value::Object(mut obj) => {
                let tracks = obj.remove("tracks").unwrap_or(Value::Array(Vec::new()));
                let users = match obj.remove("users") {
                    Some(Value::Array(users)) => users,
                    _ => Vec::new(),
                };
                Ok(Self::new(serde_json::from_value(tracks)?).with_users(users))
            }
            _ => Err(Error::Config(
                "catalog file must hold an array of tracks or an object with `tracks`".into(),
            )),
        }
    }

    /// Snapshot of all tracks in file order
    pub fn tracks(&self) -> Vec<CatalogCandidate> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<CatalogCandidate>> {
        // A poisoned lock still holds a consistent list
        self.tracks.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl TrackCatalog for JsonCatalog {
    fn get_track(&self, id: &str) -> Result<Option<CatalogCandidate>> {
        Ok(self.read().iter().find(|t| t.id == id).cloned())
    }

    fn find_by_acrcloud_id(&self, acrcloud_id: &str) -> Result<Option<CatalogCandidate>> {
        if acrcloud_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .read()
            .iter()
            .find(|t| t.acrcloud_id() == Some(acrcloud_id))
            .cloned())
    }

    fn list_tracks(&self, limit: usize, status: Option<&str>) -> Result<Vec<CatalogCandidate>> {
        Ok(self
            .read()
            .iter()
            .filter(|t| status.map_or(true, |s| t.str_field("status") == Some(s)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn producer_email(&self, producer_id: &str) -> Result<Option<String>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.get("id").and_then(Value::as_str) == Some(producer_id))
            .and_then(email_of))
    }

    fn set_acrcloud_id(&self, track_id: &str, acrcloud_id: &str) -> Result<()> {
        let mut tracks = self.tracks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
            track
                .extra
                .insert("acrcloud_id".to_string(), Value::String(acrcloud_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXPORT: &str = r#"{
        "tracks": [
            {"id": "t1", "title": "Midnight Drive", "producer_name": "DJ Nova",
             "producer_id": "u1", "status": "approved", "acrcloud_id": "acr-1"},
            {"id": "t2", "title": "Sunset Groove", "producer_name": "Otherguy", "status": "pending"},
            {"id": "t3", "title": null, "producer_name": null, "status": "approved"}
        ],
        "users": [{"id": "u1", "email": "nova@example.com"}, {"id": "u2", "email": ""}]
    }"#;

    #[test]
    fn test_load_object_export() {
        let catalog = JsonCatalog::from_json(EXPORT).unwrap();
        assert_eq!(catalog.tracks().len(), 3);
        assert_eq!(catalog.get_track("t2").unwrap().unwrap().title, "Sunset Groove");
        assert!(catalog.get_track("missing").unwrap().is_none());
        assert_eq!(catalog.get_track("t3").unwrap().unwrap().title, "");
    }

    #[test]
    fn test_load_array_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": "a", "title": "A", "producer_name": "P"}}]"#).unwrap();
        let catalog = JsonCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.tracks()[0].id, "a");
    }

    #[test]
    fn test_rejects_scalar_file() {
        assert!(matches!(JsonCatalog::from_json("42"), Err(Error::Config(_))));
    }

    #[test]
    fn test_list_with_status_and_limit() {
        let catalog = JsonCatalog::from_json(EXPORT).unwrap();
        let approved = catalog.list_tracks(10, Some(APPROVED_STATUS)).unwrap();
        let ids: Vec<_> = approved.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        assert_eq!(catalog.list_tracks(2, None).unwrap().len(), 2);
    }

    #[test]
    fn test_find_and_backfill_acrcloud_id() {
        let catalog = JsonCatalog::from_json(EXPORT).unwrap();
        assert_eq!(catalog.find_by_acrcloud_id("acr-1").unwrap().unwrap().id, "t1");
        assert!(catalog.find_by_acrcloud_id("acr-2").unwrap().is_none());
        assert!(catalog.find_by_acrcloud_id("").unwrap().is_none());

        catalog.set_acrcloud_id("t2", "acr-2").unwrap();
        assert_eq!(catalog.find_by_acrcloud_id("acr-2").unwrap().unwrap().id, "t2");
    }

    #[test]
    fn test_producer_email() {
        let catalog = JsonCatalog::from_json(EXPORT).unwrap();
        assert_eq!(catalog.producer_email("u1").unwrap().as_deref(), Some("nova@example.com"));
        assert_eq!(catalog.producer_email("u2").unwrap(), None);
        assert_eq!(catalog.producer_email("nobody").unwrap(), None);
    }
}
