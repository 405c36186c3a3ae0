//! Feed collection and article extraction.
//!
//! Two-phase, mirroring every stage's isolation policy: first discover
//! candidate URLs from all configured feeds (a malformed or unreachable feed
//! is logged and skipped, never aborting the batch), then fetch and extract
//! readable content per admitted URL with the same per-item isolation.
//!
//! Admission consults the allowlist/SSRF validator and the TTL cache; the
//! collector itself never writes to the cache; URLs are cached only after a
//! successful summarization, so failed articles stay eligible next run.

use crate::cache::ArticleCache;
use crate::error::{Error, Result};
use crate::models::Article;
use crate::security;
use itertools::Itertools;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Bodies at or below this many characters are unusable; the extractor falls
/// back to the page's meta description before giving up.
const MIN_BODY_CHARS: usize = 50;

/// Collector output plus the pre-limit candidate count for run metrics.
#[derive(Debug)]
pub struct Collected {
    pub articles: Vec<Article>,
    /// Admissible, uncached URLs discovered this run (before the article
    /// ceiling was applied).
    pub eligible_urls: usize,
}

/// Collect articles from all feeds, bounded by `limit` (None = unlimited).
///
/// Excess eligible URLs beyond the limit are simply not fetched this run;
/// since they were never cached they stay eligible for the next one.
pub async fn collect_articles(
    http: &reqwest::Client,
    feeds: &[String],
    cache: &mut ArticleCache,
    allowlist: &HashSet<String>,
    limit: Option<usize>,
) -> Collected {
    let mut candidates: Vec<String> = Vec::new();
    for feed_url in feeds {
        match fetch_text(http, feed_url).await {
            Ok(xml) => match parse_feed_links(&xml) {
                Ok(links) => {
                    info!(feed = %feed_url, entries = links.len(), "Parsed feed");
                    candidates.extend(links);
                }
                Err(e) => warn!(feed = %feed_url, error = %e, "Skipping malformed feed"),
            },
            Err(e) => warn!(feed = %feed_url, error = %e, "Skipping unreachable feed"),
        }
    }

    let unique = dedupe_urls(candidates);
    info!(unique = unique.len(), "Candidate URLs after dedupe");

    let mut eligible: Vec<String> = Vec::new();
    for url in unique {
        if cache.is_cached(&url) {
            debug!(%url, "Skipping cached URL");
            continue;
        }
        if let Err(reason) = security::check_admissible(&url, allowlist).await {
            info!(%url, %reason, "Skipping URL");
            continue;
        }
        eligible.push(url);
    }
    let eligible_urls = eligible.len();
    info!(eligible = eligible_urls, "URLs passed cache and security filters");

    let articles =
        extract_limited(eligible, limit, |url| async move { fetch_text(http, &url).await }).await;

    info!(count = articles.len(), "Collected articles");
    Collected {
        articles,
        eligible_urls,
    }
}

/// Fetch and extract eligible URLs in order, stopping once `limit` articles
/// have been produced. URLs past the ceiling are never fetched.
async fn extract_limited<F, Fut>(urls: Vec<String>, limit: Option<usize>, fetch: F) -> Vec<Article>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut articles: Vec<Article> = Vec::new();
    for url in urls {
        if let Some(max) = limit {
            if articles.len() >= max {
                info!(max, "Article ceiling reached; leaving remaining URLs for the next run");
                break;
            }
        }
        match fetch(url.clone()).await {
            Ok(html) => match extract_article(&url, &html) {
                Some(article) => {
                    info!(%url, title = %article.title, "Extracted article");
                    articles.push(article);
                }
                None => warn!(%url, "Article too short or empty; skipping"),
            },
            Err(e) => warn!(%url, error = %e, "Fetch failed; skipping article"),
        }
    }
    articles
}

/// Order-preserving dedupe; first occurrence wins.
pub fn dedupe_urls(urls: Vec<String>) -> Vec<String> {
    urls.into_iter().unique().collect()
}

async fn fetch_text(http: &reqwest::Client, url: &str) -> Result<String> {
    let text = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}

/// Extract article link URLs from RSS 2.0 (`<item><link>`) or Atom
/// (`<entry><link href>`) XML.
pub fn parse_feed_links(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut links = Vec::new();
    let mut in_item = false;
    let mut in_entry = false;
    let mut capture_text = false;

    loop {
        match reader.read_event() {
            Err(e) => return Err(Error::Feed(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => in_item = true,
                b"entry" => in_entry = true,
                b"link" if in_item => capture_text = true,
                b"link" if in_entry => {
                    if let Some(href) = atom_href(&e)? {
                        links.push(href);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" && in_entry {
                    if let Some(href) = atom_href(&e)? {
                        links.push(href);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" => in_item = false,
                b"entry" => in_entry = false,
                b"link" => capture_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if capture_text => {
                let text = t
                    .xml_content()
                    .map_err(|e| Error::Feed(e.to_string()))?
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    links.push(text);
                }
            }
            Ok(Event::CData(t)) if capture_text => {
                let text = String::from_utf8_lossy(&t.into_inner()).trim().to_string();
                if !text.is_empty() {
                    links.push(text);
                }
            }
            Ok(_) => {}
        }
    }

    Ok(links)
}

/// Pull the `href` from an Atom `<link>` when its `rel` is absent or
/// `alternate` (other rels point at the feed itself, comments, etc.).
fn atom_href(element: &BytesStart<'_>) -> Result<Option<String>> {
    let mut href: Option<String> = None;
    let mut rel_ok = true;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::Feed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Feed(e.to_string()))?;
        match attr.key.as_ref() {
            b"href" => href = Some(value.to_string()),
            b"rel" => rel_ok = value == "alternate",
            _ => {}
        }
    }
    Ok(if rel_ok { href } else { None })
}

/// Extract readable content from an article page.
///
/// Title comes from `og:title`, falling back to `<title>` then the first
/// `<h1>`. Body text joins paragraphs inside `<article>`, falling back to all
/// paragraphs; a too-short body is substituted with the meta description
/// before the article is discarded as unusable.
pub fn extract_article(url: &str, html: &str) -> Option<Article> {
    let document = Html::parse_document(html);

    let og_title = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    let page_title = Selector::parse("title").unwrap();
    let h1 = Selector::parse("h1").unwrap();
    let article_paragraphs = Selector::parse("article p").unwrap();
    let all_paragraphs = Selector::parse("p").unwrap();
    let description = Selector::parse(r#"meta[name="description"]"#).unwrap();
    let published = Selector::parse(r#"meta[property="article:published_time"]"#).unwrap();

    let title = document
        .select(&og_title)
        .find_map(|el| el.value().attr("content").map(str::trim).map(str::to_string))
        .or_else(|| {
            document
                .select(&page_title)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .or_else(|| {
            document
                .select(&h1)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let mut body = join_paragraphs(document.select(&article_paragraphs));
    if body.is_empty() {
        body = join_paragraphs(document.select(&all_paragraphs));
    }

    // Some sites serve very short bodies; keep the meta description as a
    // fallback so the article isn't dropped outright.
    let text = if body.chars().count() > MIN_BODY_CHARS {
        body
    } else {
        let desc = document
            .select(&description)
            .find_map(|el| el.value().attr("content").map(str::trim).map(str::to_string))
            .unwrap_or_default();
        if desc.chars().count() > MIN_BODY_CHARS {
            desc
        } else {
            return None;
        }
    };

    let publish_date = document
        .select(&published)
        .find_map(|el| el.value().attr("content").map(str::to_string));

    Some(Article {
        url: url.to_string(),
        title,
        text,
        publish_date,
    })
}

fn join_paragraphs<'a>(paragraphs: impl Iterator<Item = scraper::ElementRef<'a>>) -> String {
    paragraphs
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_preserves_first_occurrence_order() {
        let urls = vec![
            "https://news.example/a".to_string(),
            "https://news.example/b".to_string(),
            "https://news.example/a".to_string(),
            "https://news.example/c".to_string(),
        ];
        assert_eq!(
            dedupe_urls(urls),
            vec![
                "https://news.example/a",
                "https://news.example/b",
                "https://news.example/c",
            ]
        );
    }

    #[test]
    fn test_parse_rss_item_links() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0">
              <channel>
                <title>Example Feed</title>
                <link>https://news.example</link>
                <item>
                  <title>First</title>
                  <link>https://news.example/first</link>
                </item>
                <item>
                  <title>Second</title>
                  <link> https://news.example/second </link>
                </item>
                <item>
                  <title>Third</title>
                  <link>https://news.example/third?a=1&amp;b=2</link>
                </item>
              </channel>
            </rss>"#;

        let links = parse_feed_links(xml).unwrap();
        assert_eq!(
            links,
            vec![
                "https://news.example/first",
                "https://news.example/second",
                "https://news.example/third?a=1&b=2",
            ]
        );
    }

    #[test]
    fn test_parse_rss_channel_link_ignored() {
        let xml = r#"<rss><channel>
            <link>https://news.example</link>
            <item><link>https://news.example/only</link></item>
        </channel></rss>"#;
        let links = parse_feed_links(xml).unwrap();
        assert_eq!(links, vec!["https://news.example/only"]);
    }

    #[test]
    fn test_parse_atom_entry_links() {
        let xml = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <link rel="self" href="https://news.example/feed.xml"/>
              <entry>
                <link rel="alternate" href="https://news.example/one"/>
              </entry>
              <entry>
                <link href="https://news.example/two"/>
                <link rel="enclosure" href="https://news.example/two.mp3"/>
              </entry>
            </feed>"#;

        let links = parse_feed_links(xml).unwrap();
        assert_eq!(
            links,
            vec!["https://news.example/one", "https://news.example/two"]
        );
    }

    #[test]
    fn test_parse_feed_malformed_is_error() {
        assert!(parse_feed_links("<rss><channel><item></rss>").is_err());
    }

    #[test]
    fn test_extract_article_prefers_article_paragraphs() {
        let html = r#"<html><head>
            <meta property="og:title" content="Big Story"/>
            <meta property="article:published_time" content="2026-08-20T10:00:00Z"/>
            <title>Big Story - Example News</title>
            </head><body>
            <p>navigation junk</p>
            <article>
              <p>The first paragraph of the story, long enough to count as real body text.</p>
              <p>A second paragraph with further detail about the event in question.</p>
            </article>
            </body></html>"#;

        let article = extract_article("https://news.example/big", html).unwrap();
        assert_eq!(article.title, "Big Story");
        assert!(article.text.starts_with("The first paragraph"));
        assert!(article.text.contains("second paragraph"));
        assert!(!article.text.contains("navigation junk"));
        assert_eq!(
            article.publish_date.as_deref(),
            Some("2026-08-20T10:00:00Z")
        );
    }

    #[test]
    fn test_extract_article_meta_description_fallback() {
        let html = r#"<html><head>
            <title>Short One</title>
            <meta name="description" content="A description that is comfortably longer than the fifty character minimum threshold."/>
            </head><body><p>tiny</p></body></html>"#;

        let article = extract_article("https://news.example/short", html).unwrap();
        assert_eq!(article.title, "Short One");
        assert!(article.text.starts_with("A description"));
    }

    #[test]
    fn test_extract_article_too_short_is_discarded() {
        let html = "<html><head><title>Empty</title></head><body><p>tiny</p></body></html>";
        assert!(extract_article("https://news.example/empty", html).is_none());
    }

    fn page(title: &str) -> String {
        format!(
            r#"<html><head><title>{title}</title></head><body><article>
            <p>A body paragraph long enough to clear the minimum length check.</p>
            </article></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_article_ceiling_stops_fetching_and_leaves_excess_eligible() {
        use crate::cache::ArticleCache;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tempfile::tempdir;

        let urls: Vec<String> = (0..5).map(|n| format!("https://news.example/{n}")).collect();
        let fetches = AtomicUsize::new(0);

        let articles = extract_limited(urls.clone(), Some(2), |url| {
            fetches.fetch_add(1, Ordering::SeqCst);
            async move { Ok(page(&url)) }
        })
        .await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].url, "https://news.example/0");
        assert_eq!(articles[1].url, "https://news.example/1");
        // URLs past the ceiling were never fetched.
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // Collection never caches; every URL stays eligible for the next run.
        let dir = tempdir().unwrap();
        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 24);
        for url in &urls {
            assert!(!cache.is_cached(url));
        }
    }

    #[tokio::test]
    async fn test_extraction_failures_do_not_consume_the_ceiling() {
        let urls: Vec<String> = (0..4).map(|n| format!("https://news.example/{n}")).collect();

        let articles = extract_limited(urls, Some(2), |url| async move {
            if url.ends_with("/0") {
                Err(Error::Feed("connection reset".to_string()))
            } else {
                Ok(page(&url))
            }
        })
        .await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].url, "https://news.example/1");
        assert_eq!(articles[1].url, "https://news.example/2");
    }
}
