//! Wire format of the page ⇄ worker command channel.

use serde::{Deserialize, Serialize};

/// Inbound command from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
  /// Activate a waiting installation now
  SkipWaiting,
  /// Delete every cache generation and notify open pages
  ClearCache,
  /// Report the current generation's contents on the reply channel
  GetCacheStatus,
  /// Run the age-based cleanup sweeps
  Cleanup,
}

/// Reply sent on a command's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
  CacheStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<CacheStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
  },
}

impl Reply {
  pub fn status(result: color_eyre::Result<CacheStatus>) -> Self {
    match result {
      Ok(status) => Reply::CacheStatus {
        data: Some(status),
        error: None,
      },
      Err(e) => Reply::CacheStatus {
        data: None,
        error: Some(e.to_string()),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
  pub cache_name: String,
  pub cached_urls: Vec<String>,
  pub count: usize,
}

/// Notification broadcast to every open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  CacheCleared { message: String },
}
