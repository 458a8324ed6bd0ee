use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Outbox, OutboxItem, OutboxKind};
use crate::config::Config;
use crate::net::{Fetcher, Request};

/// Outcome of one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
  /// Delivered and removed from the outbox
  pub sent: usize,
  /// Left in place for the next trigger
  pub failed: usize,
  /// Already being replayed by a concurrent pass
  pub skipped: usize,
}

impl AddAssign for ReplayReport {
  fn add_assign(&mut self, other: Self) {
    self.sent += other.sent;
    self.failed += other.failed;
    self.skipped += other.skipped;
  }
}

/// Replays queued actions against their endpoints.
///
/// Safe to trigger concurrently: each item is marked in flight while being
/// sent, so overlapping passes skip it instead of sending it twice.
pub struct Replayer {
  outbox: Arc<Outbox>,
  fetcher: Arc<dyn Fetcher>,
  config: Arc<Config>,
  in_flight: Mutex<HashSet<i64>>,
}

/// Removes the in-flight marker when dropped.
struct Claim<'a> {
  in_flight: &'a Mutex<HashSet<i64>>,
  id: i64,
}

impl Drop for Claim<'_> {
  fn drop(&mut self) {
    if let Ok(mut in_flight) = self.in_flight.lock() {
      in_flight.remove(&self.id);
    }
  }
}

impl Replayer {
  pub fn new(outbox: Arc<Outbox>, fetcher: Arc<dyn Fetcher>, config: Arc<Config>) -> Self {
    Self {
      outbox,
      fetcher,
      config,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Replay every pending item of `kind`, oldest first.
  pub async fn replay(&self, kind: OutboxKind) -> Result<ReplayReport> {
    let endpoint = self.config.resolve(self.config.endpoints.for_kind(kind))?;
    let items = self.outbox.pending(kind)?;
    let mut report = ReplayReport::default();

    for item in items {
      let _claim = match self.claim(item.id) {
        Some(claim) => claim,
        None => {
          report.skipped += 1;
          continue;
        }
      };

      // A concurrent pass may have delivered it since we listed the queue.
      match self.outbox.get(item.id) {
        Ok(Some(_)) => {}
        Ok(None) => {
          report.skipped += 1;
          continue;
        }
        Err(e) => {
          warn!(id = item.id, kind = %kind, error = %e, "Failed to re-read outbox item");
          report.failed += 1;
          continue;
        }
      }

      match self.send(&endpoint, &item).await {
        Ok(()) => match self.outbox.delete(item.id) {
          Ok(_) => {
            debug!(id = item.id, kind = %kind, "Outbox item delivered");
            report.sent += 1;
          }
          Err(e) => {
            // Delivered but still queued: it will be sent again next time.
            error!(id = item.id, error = %e, "Failed to remove delivered outbox item");
            report.failed += 1;
          }
        },
        Err(e) => {
          warn!(id = item.id, kind = %kind, error = %e, "Failed to replay outbox item");
          report.failed += 1;
        }
      }
    }

    info!(kind = %kind, sent = report.sent, failed = report.failed, "Outbox replay finished");
    Ok(report)
  }

  /// Replay every kind. Kinds run concurrently and independently.
  pub async fn replay_all(&self) -> ReplayReport {
    let passes = OutboxKind::ALL.map(|kind| self.replay(kind));
    let results = futures::future::join_all(passes).await;

    let mut report = ReplayReport::default();
    for (kind, result) in OutboxKind::ALL.iter().zip(results) {
      match result {
        Ok(r) => report += r,
        Err(e) => error!(kind = %kind, error = %e, "Outbox replay failed"),
      }
    }
    report
  }

  fn claim(&self, id: i64) -> Option<Claim<'_>> {
    let mut in_flight = self.in_flight.lock().ok()?;
    if !in_flight.insert(id) {
      return None;
    }
    Some(Claim {
      in_flight: &self.in_flight,
      id,
    })
  }

  async fn send(&self, endpoint: &Url, item: &OutboxItem) -> Result<()> {
    let request = Request::post_json(endpoint.clone(), &item.payload)?;
    let response = self.fetcher.fetch(&request).await?;
    if response.ok() {
      Ok(())
    } else {
      Err(eyre!("{} returned status {}", endpoint, response.status))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{self, MockFetcher};
  use serde_json::json;
  use std::time::Duration;

  fn setup() -> (Replayer, Arc<Outbox>, Arc<MockFetcher>) {
    let outbox = Arc::new(Outbox::open_in_memory().unwrap());
    let fetcher = MockFetcher::new();
    let replayer = Replayer::new(
      outbox.clone(),
      fetcher.clone(),
      Arc::new(testing::config()),
    );
    (replayer, outbox, fetcher)
  }

  #[tokio::test]
  async fn test_success_deletes_items_in_order() {
    let (replayer, outbox, fetcher) = setup();
    let endpoint = testing::url("/api/contact");
    fetcher.respond(&endpoint, 200, "ok");

    outbox
      .enqueue(OutboxKind::ContactForm, &json!({"n": 1}))
      .unwrap();
    outbox
      .enqueue(OutboxKind::ContactForm, &json!({"n": 2}))
      .unwrap();

    let report = replayer.replay(OutboxKind::ContactForm).await.unwrap();
    assert_eq!(report.sent, 2);
    assert!(outbox.is_empty().unwrap());

    let bodies: Vec<serde_json::Value> = fetcher
      .requests()
      .iter()
      .map(|r| serde_json::from_slice(r.body.as_ref().unwrap()).unwrap())
      .collect();
    assert_eq!(bodies, vec![json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(fetcher.requests()[0].method, reqwest::Method::POST);
  }

  #[tokio::test]
  async fn test_failure_leaves_item_untouched() {
    let (replayer, outbox, fetcher) = setup();
    fetcher.respond(&testing::url("/api/contact"), 500, "down");

    let id = outbox
      .enqueue(OutboxKind::ContactForm, &json!({"email": "a@b.c"}))
      .unwrap();
    let before = outbox.get(id).unwrap().unwrap();

    let report = replayer.replay(OutboxKind::ContactForm).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(outbox.get(id).unwrap().unwrap(), before);

    fetcher.set_offline(true);
    replayer.replay(OutboxKind::ContactForm).await.unwrap();
    assert_eq!(outbox.get(id).unwrap().unwrap(), before);
  }

  #[tokio::test]
  async fn test_replay_only_touches_its_kind() {
    let (replayer, outbox, fetcher) = setup();
    fetcher.respond(&testing::url("/api/articles/interaction"), 200, "ok");

    outbox
      .enqueue(OutboxKind::ContactForm, &json!({}))
      .unwrap();
    outbox
      .enqueue(OutboxKind::ArticleInteraction, &json!({"like": 1}))
      .unwrap();

    let report = replayer
      .replay(OutboxKind::ArticleInteraction)
      .await
      .unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(outbox.pending(OutboxKind::ContactForm).unwrap().len(), 1);
    assert_eq!(fetcher.calls(&testing::url("/api/contact")), 0);
  }

  #[tokio::test]
  async fn test_replay_all_is_independent_per_kind() {
    let (replayer, outbox, fetcher) = setup();
    fetcher.fail(&testing::url("/api/contact"));
    fetcher.respond(&testing::url("/api/articles/interaction"), 200, "ok");

    outbox
      .enqueue(OutboxKind::ContactForm, &json!({}))
      .unwrap();
    outbox
      .enqueue(OutboxKind::ArticleInteraction, &json!({}))
      .unwrap();

    let report = replayer.replay_all().await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(outbox.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_replays_do_not_double_send() {
    let (replayer, outbox, fetcher) = setup();
    let endpoint = testing::url("/api/contact");
    fetcher.respond(&endpoint, 200, "ok");
    fetcher.delay(&endpoint, Duration::from_millis(30));

    for n in 0..3 {
      outbox
        .enqueue(OutboxKind::ContactForm, &json!({ "n": n }))
        .unwrap();
    }

    let (a, b) = tokio::join!(
      replayer.replay(OutboxKind::ContactForm),
      replayer.replay(OutboxKind::ContactForm)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.sent + b.sent, 3);
    assert_eq!(fetcher.calls(&endpoint), 3);
    assert!(outbox.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_unreadable_item_is_counted_and_pass_continues() {
    let (replayer, outbox, fetcher) = setup();
    let endpoint = testing::url("/api/contact");
    fetcher.respond(&endpoint, 200, "ok");
    fetcher.delay(&endpoint, Duration::from_millis(40));

    let ids: Vec<i64> = (0..3)
      .map(|n| {
        outbox
          .enqueue(OutboxKind::ContactForm, &json!({ "n": n }))
          .unwrap()
      })
      .collect();

    // Corrupt the second item while the first one is still being sent.
    let corrupt = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      outbox
        .conn()
        .unwrap()
        .execute(
          "UPDATE outbox SET payload = 'not json' WHERE id = ?",
          rusqlite::params![ids[1]],
        )
        .unwrap();
    };
    let (report, ()) = tokio::join!(replayer.replay(OutboxKind::ContactForm), corrupt);
    let report = report.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(fetcher.calls(&endpoint), 2);
    assert_eq!(outbox.len().unwrap(), 1);
  }
}
