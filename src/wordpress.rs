//! WordPress REST API publishing.
//!
//! Maps the composed article onto the `wp-json/wp/v2` surface: draft post
//! creation, tag-name-to-ID resolution (creating missing tags), and media
//! upload for the cover image. Authentication is HTTP Basic with an
//! application password. Post creation and media upload go through the retry
//! wrapper; taxonomy and image failures degrade to a post without them.

use crate::categorize::Categorizer;
use crate::config::WordPressConfig;
use crate::error::{Error, Result};
use crate::image::{search_query_from_tags, ImageAsset, UnsplashClient};
use crate::models::ComposedArticle;
use crate::retry::{with_backoff, Backoff};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of a created draft post.
#[derive(Debug, Clone)]
pub struct PostInfo {
    pub id: u64,
    pub url: String,
}

/// Uploaded media: the CMS-side ID plus the public URL for inline embedding.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub id: u64,
    pub source_url: String,
}

pub struct WordPressClient {
    http: reqwest::Client,
    api_base: String,
    username: String,
    app_password: String,
}

#[derive(Deserialize)]
struct PostResponse {
    id: u64,
    link: String,
}

#[derive(Deserialize)]
struct TagResponse {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct MediaResponse {
    id: u64,
    source_url: String,
}

#[derive(Serialize)]
struct DraftRequest<'a> {
    title: &'a str,
    content: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    categories: &'a [u64],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [u64],
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_media: Option<u64>,
}

impl WordPressClient {
    pub fn new(config: &WordPressConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: format!("{}/wp-json/wp/v2", config.site_url.trim_end_matches('/')),
            username: config.username.clone(),
            app_password: config.app_password.clone(),
        })
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut message = response.text().await.unwrap_or_default();
        if message.len() > 300 {
            message.truncate(300);
            message.push('…');
        }
        Err(Error::Api {
            service: "wordpress",
            status,
            message,
        })
    }

    /// Create a draft post; returns its ID and URL.
    pub async fn create_draft_post(
        &self,
        title: &str,
        content: &str,
        categories: &[u64],
        tags: &[u64],
        featured_media: Option<u64>,
    ) -> Result<PostInfo> {
        info!(title, "Creating WordPress draft");
        let request = DraftRequest {
            title,
            content,
            status: "draft",
            categories,
            tags,
            featured_media,
        };
        let response = self
            .http
            .post(format!("{}/posts", self.api_base))
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&request)
            .send()
            .await?;
        let parsed: PostResponse = self.check(response).await?.json().await?;

        info!(id = parsed.id, url = %parsed.link, "Draft created");
        Ok(PostInfo {
            id: parsed.id,
            url: parsed.link,
        })
    }

    /// Resolve a tag name to its ID, creating the tag when absent.
    pub async fn ensure_tag(&self, name: &str) -> Result<u64> {
        let response = self
            .http
            .get(format!("{}/tags", self.api_base))
            .basic_auth(&self.username, Some(&self.app_password))
            .query(&[("search", name)])
            .send()
            .await?;
        let matches: Vec<TagResponse> = self.check(response).await?.json().await?;

        if let Some(tag) = matches
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            return Ok(tag.id);
        }

        let response = self
            .http
            .post(format!("{}/tags", self.api_base))
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let created: TagResponse = self.check(response).await?.json().await?;
        info!(tag = name, id = created.id, "Created tag");
        Ok(created.id)
    }

    /// Upload media bytes; returns the media ID and its public URL.
    pub async fn upload_media(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaInfo> {
        let response = self
            .http
            .post(format!("{}/media", self.api_base))
            .basic_auth(&self.username, Some(&self.app_password))
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .header(reqwest::header::CONTENT_TYPE, content_type.to_string())
            .body(bytes)
            .send()
            .await?;
        let parsed: MediaResponse = self.check(response).await?.json().await?;

        info!(id = parsed.id, url = %parsed.source_url, "Media uploaded");
        Ok(MediaInfo {
            id: parsed.id,
            source_url: parsed.source_url,
        })
    }
}

/// Publish the composed article as a WordPress draft with auto-assigned
/// taxonomy and an optional cover image.
pub async fn publish_article(
    article: &ComposedArticle,
    wp_config: &WordPressConfig,
    categorizer: &Categorizer,
    unsplash: Option<&UnsplashClient>,
) -> Result<PostInfo> {
    let client = WordPressClient::new(wp_config)?;
    let backoff = Backoff::default();

    let (categories, tag_names) = categorizer.categorize(&article.title, &article.markdown);

    // Taxonomy resolution is best-effort; a missing tag never blocks publish.
    let mut tag_ids: Vec<u64> = Vec::new();
    for name in &tag_names {
        match with_backoff(&backoff, "wordpress.ensure_tag", || client.ensure_tag(name)).await {
            Ok(id) => tag_ids.push(id),
            Err(e) => warn!(tag = %name, error = %e, "Tag resolution failed; skipping tag"),
        }
    }

    let mut content = article.markdown.clone();
    let mut featured_media = None;
    if let Some(unsplash) = unsplash {
        let query = search_query_from_tags(&tag_names)
            .unwrap_or_else(|| article.title.to_lowercase());
        match fetch_and_upload_image(&client, unsplash, &query, &article.title, &backoff).await {
            Some((media, asset)) => {
                content = embed_cover_image(&content, &article.title, &media, &asset);
                featured_media = Some(media.id);
            }
            None => warn!("Publishing without cover image"),
        }
    }

    with_backoff(&backoff, "wordpress.create_draft", || {
        client.create_draft_post(
            &article.title,
            &content,
            &categories,
            &tag_ids,
            featured_media,
        )
    })
    .await
}

async fn fetch_and_upload_image(
    client: &WordPressClient,
    unsplash: &UnsplashClient,
    query: &str,
    title: &str,
    backoff: &Backoff,
) -> Option<(MediaInfo, ImageAsset)> {
    let asset = unsplash.search_and_download(query).await?;
    let filename = format!("{}.jpg", query.replace(' ', "_"));

    let upload = with_backoff(backoff, "wordpress.upload_media", || {
        client.upload_media(&filename, &asset.content_type, asset.bytes.clone())
    })
    .await;

    match upload {
        Ok(media) => {
            info!(title, photographer = %asset.photographer, "Cover image uploaded");
            Some((media, asset))
        }
        Err(e) => {
            warn!(error = %e, "Media upload failed");
            None
        }
    }
}

/// Insert the cover image inline after the first heading (or at the top when
/// there is none), with the attribution caption Unsplash requires.
fn embed_cover_image(
    markdown: &str,
    title: &str,
    media: &MediaInfo,
    asset: &ImageAsset,
) -> String {
    let figure = format!(
        "![{title}]({})\n\n*Photo by [{}]({}) on Unsplash*",
        media.source_url, asset.photographer, asset.photographer_url
    );

    let lines: Vec<&str> = markdown.lines().collect();
    if let Some(heading_idx) = lines.iter().position(|l| l.trim_start().starts_with('#')) {
        let mut out = lines[..=heading_idx].join("\n");
        out.push_str("\n\n");
        out.push_str(&figure);
        if heading_idx + 1 < lines.len() {
            out.push_str("\n\n");
            out.push_str(lines[heading_idx + 1..].join("\n").trim_start_matches('\n'));
        }
        out
    } else {
        format!("{figure}\n\n{markdown}")
    }
}
