//! News feed ingestion — pulls a NewsAPI-shaped document and submits each
//! article to the ingestion topic.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::error::FeedError;
use crate::model::{ContentKind, ContentSubmission};
use crate::pipeline::{INGESTION_TOPIC, PipelineMessage};

/// Pause between article submissions so a large feed doesn't flood the
/// pipeline in one burst.
const INTER_ARTICLE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedArticle {
    pub source: Option<FeedSource>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "urlToImage")]
    pub image_url: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    status: String,
    #[serde(default)]
    articles: Vec<FeedArticle>,
}

/// Fetch the article list from a NewsAPI-shaped endpoint.
pub async fn fetch_articles(feed_url: &str) -> Result<Vec<FeedArticle>, FeedError> {
    let response = reqwest::get(feed_url)
        .await
        .map_err(|e| FeedError::Http(e.to_string()))?
        .error_for_status()
        .map_err(|e| FeedError::Http(e.to_string()))?;

    let feed: FeedResponse = response
        .json()
        .await
        .map_err(|e| FeedError::Malformed(e.to_string()))?;

    if feed.status != "ok" {
        return Err(FeedError::Malformed(format!(
            "feed status was '{}'",
            feed.status
        )));
    }
    Ok(feed.articles)
}

/// Convert one article into a news submission. Articles without both a
/// title and a body are skipped (`None`).
pub fn article_to_submission(article: &FeedArticle) -> Option<ContentSubmission> {
    let title = article.title.as_deref().filter(|t| !t.is_empty())?;
    let content = article.content.as_deref().filter(|c| !c.is_empty())?;

    Some(ContentSubmission {
        kind: ContentKind::News,
        content: content.to_string(),
        content_id: Uuid::new_v4().to_string(),
        source_user_id: None,
        metadata: Some(serde_json::json!({
            "title": title,
            "author": article.author,
            "publishedAt": article.published_at,
            "url": article.url,
            "imageUrl": article.image_url,
            "source": article.source.as_ref().and_then(|s| s.name.clone()),
        })),
    })
}

/// Fetch the feed and publish every usable article to the ingestion topic.
/// Returns the number of articles submitted.
pub async fn ingest_articles(
    bus: &Arc<MessageBus<PipelineMessage>>,
    feed_url: &str,
) -> Result<usize, FeedError> {
    let articles = fetch_articles(feed_url).await?;
    info!(count = articles.len(), "Fetched news articles");

    let mut submitted = 0;
    for article in &articles {
        let Some(submission) = article_to_submission(article) else {
            debug!(title = ?article.title, "Skipping article without title or body");
            continue;
        };

        bus.publish(INGESTION_TOPIC, PipelineMessage::Submission(submission))
            .await;
        submitted += 1;

        tokio::time::sleep(INTER_ARTICLE_DELAY).await;
    }

    Ok(submitted)
}
