//! Unsplash image search and download for post cover images.
//!
//! Entirely optional enrichment: every failure path here returns `None` with
//! a warning, and the publish proceeds without an image. Attribution
//! (photographer name and profile link) travels with the bytes so the
//! publisher can embed a caption.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const API_URL: &str = "https://api.unsplash.com";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A downloaded image plus the attribution Unsplash requires.
#[derive(Debug)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub photographer: String,
    pub photographer_url: String,
}

pub struct UnsplashClient {
    http: reqwest::Client,
    access_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    urls: PhotoUrls,
    links: PhotoLinks,
    user: PhotoUser,
}

#[derive(Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Deserialize)]
struct PhotoLinks {
    download_location: String,
}

#[derive(Deserialize)]
struct PhotoUser {
    name: String,
    links: UserLinks,
}

#[derive(Deserialize)]
struct UserLinks {
    html: String,
}

impl UnsplashClient {
    pub fn new(access_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_key,
        }
    }

    /// Search for one landscape photo matching `query` and download it.
    /// Any failure is degraded to `None`.
    pub async fn search_and_download(&self, query: &str) -> Option<ImageAsset> {
        let photo = self.search(query).await?;

        // Unsplash API guideline: hit the download-tracking endpoint before
        // fetching the image itself. Failures here are ignorable.
        let _ = self
            .http
            .get(&photo.links.download_location)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await;

        let response = match self
            .http
            .get(&photo.urls.regular)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
        {
            Ok(r) if r.status() == StatusCode::OK => r,
            Ok(r) => {
                warn!(status = %r.status(), "Image download failed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Image download failed");
                return None;
            }
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                warn!(error = %e, "Image body read failed");
                return None;
            }
        };

        info!(
            photographer = %photo.user.name,
            bytes = bytes.len(),
            "Downloaded cover image"
        );
        Some(ImageAsset {
            bytes,
            content_type,
            photographer: photo.user.name,
            photographer_url: photo.user.links.html,
        })
    }

    async fn search(&self, query: &str) -> Option<Photo> {
        info!(query, "Searching Unsplash for cover image");
        let response = match self
            .http
            .get(format!("{API_URL}/search/photos"))
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .query(&[
                ("query", query),
                ("orientation", "landscape"),
                ("per_page", "1"),
            ])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "Unsplash search failed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Unsplash search failed");
                return None;
            }
        };

        let parsed: SearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Unsplash response unparsable");
                return None;
            }
        };

        if parsed.total == 0 || parsed.results.is_empty() {
            warn!(query, "No images found");
            return None;
        }
        parsed.results.into_iter().next()
    }
}

/// Derive a focused search query from assigned tags; single keywords work
/// better against Unsplash than combined ones.
pub fn search_query_from_tags(tags: &[String]) -> Option<String> {
    tags.first().map(|t| t.to_lowercase())
}
