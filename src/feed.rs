//! The dynamic article feed served to the page.
//!
//! The engine treats the feed as opaque apart from checking that it is a JSON
//! object with an `articles` array. When neither the network nor the cache can
//! provide it, a single-item placeholder feed is synthesized so the page always
//! receives something it can render.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::net::Response;

/// Header set on synthesized placeholder responses.
pub const FALLBACK_HEADER: &str = "X-Offline-Fallback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
  pub id: u64,
  pub title: String,
  pub category: String,
  pub excerpt: String,
  pub url: String,
  pub author: String,
  pub publish_date: String,
  pub read_time: String,
  pub tags: Vec<String>,
  pub featured: bool,
  pub views: u64,
  pub likes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleFeed {
  pub articles: Vec<Article>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Value>,
}

/// Check that `body` is a JSON object carrying an `articles` array.
pub fn validate(body: &[u8]) -> Result<()> {
  let value: Value =
    serde_json::from_slice(body).map_err(|e| eyre!("Feed is not valid JSON: {}", e))?;

  match value.get("articles") {
    Some(Value::Array(_)) => Ok(()),
    Some(_) => Err(eyre!("Feed field 'articles' is not an array")),
    None => Err(eyre!("Feed has no 'articles' field")),
  }
}

/// The built-in feed used when nothing better is available.
pub fn placeholder() -> ArticleFeed {
  ArticleFeed {
    articles: vec![Article {
      id: 1,
      title: "Artificial intelligence and the future of work".to_string(),
      category: "Technology".to_string(),
      excerpt: "How is AI changing the job market, and which skills will you need?".to_string(),
      url: "articles/ai-future-work.html".to_string(),
      author: "Editorial team".to_string(),
      publish_date: "2024-09-15".to_string(),
      read_time: "7 min read".to_string(),
      tags: vec![
        "AI".to_string(),
        "Technology".to_string(),
        "Jobs".to_string(),
      ],
      featured: true,
      views: 1250,
      likes: 89,
    }],
    metadata: Some(serde_json::json!({
      "fallback": true,
      "message": "Offline: showing cached placeholder content",
    })),
  }
}

/// The placeholder feed as a 200 JSON response marked with [`FALLBACK_HEADER`].
pub fn placeholder_response() -> Result<Response> {
  let body = serde_json::to_vec(&placeholder())
    .map_err(|e| eyre!("Failed to serialize placeholder feed: {}", e))?;

  Ok(
    Response::new(200, body)
      .with_header("Content-Type", "application/json")
      .with_header(FALLBACK_HEADER, "placeholder"),
  )
}
