//! Durable queue of actions taken while offline.
//!
//! Items are appended when the page cannot reach the network and replayed
//! when connectivity returns. Delivery is at-least-once: an item is deleted
//! only after its replay succeeded, and never modified in place.

mod replay;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub use replay::{ReplayReport, Replayer};
pub use store::Outbox;

/// Kind of deferred action; doubles as the background sync tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutboxKind {
  ContactForm,
  ArticleInteraction,
}

impl OutboxKind {
  pub const ALL: [OutboxKind; 2] = [OutboxKind::ContactForm, OutboxKind::ArticleInteraction];

  pub fn as_str(&self) -> &'static str {
    match self {
      OutboxKind::ContactForm => "contact-form",
      OutboxKind::ArticleInteraction => "article-interaction",
    }
  }
}

impl fmt::Display for OutboxKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OutboxKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OutboxKind::ALL
      .into_iter()
      .find(|kind| kind.as_str() == s)
      .ok_or_else(|| format!("unknown outbox kind '{}'", s))
  }
}

/// A queued action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxItem {
  pub id: i64,
  pub kind: OutboxKind,
  pub payload: Value,
  pub enqueued_at: DateTime<Utc>,
}
