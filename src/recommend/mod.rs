//! Client for the external recommendation service.
//!
//! Only track search is proxied. The service's dataset repeats tracks under
//! different ids, so results are de-duplicated before they reach clients.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Queries shorter than this never reach the service.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: String,
    pub track_name: String,
    pub artist: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    success: bool,
    #[serde(default)]
    results: Vec<TrackSummary>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Recommendation service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Recommendation service returned status {0}")]
    Status(u16),
}

pub struct RecommendationClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecommendationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RecommendError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn search_tracks(&self, query: &str) -> Result<Vec<TrackSummary>, RecommendError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .get(format!("{}/api/search", self.base_url))
            .query(&[("query", query)])
            .send()
            .await?;

        // Failed searches still carry a `success: false` body
        let status = response.status();
        let response: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(RecommendError::Status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        if !response.success {
            tracing::warn!(
                "Recommendation search for {:?} failed: {}",
                query,
                response.error.as_deref().unwrap_or("unknown error")
            );
            return Ok(Vec::new());
        }

        let total = response.results.len();
        let tracks = dedupe_tracks(response.results);
        tracing::debug!("Track search {:?}: {} results, {} unique", query, total, tracks.len());

        Ok(tracks)
    }
}

/// Drop any track whose id, or lower-cased name+artist pair, was already seen.
/// First occurrence wins and order is preserved.
pub fn dedupe_tracks(tracks: Vec<TrackSummary>) -> Vec<TrackSummary> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    tracks
        .into_iter()
        .filter(|track| {
            let name_key = format!(
                "{}|{}",
                track.track_name.to_lowercase(),
                track.artist.to_lowercase()
            );
            if seen_ids.contains(&track.track_id) || seen_names.contains(&name_key) {
                return false;
            }
            seen_ids.insert(track.track_id.clone());
            seen_names.insert(name_key);
            true
        })
        .collect()
}
