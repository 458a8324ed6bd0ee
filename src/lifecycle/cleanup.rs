use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::outbox::Outbox;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
  pub outbox_removed: usize,
  pub entries_removed: usize,
  /// Deletions or listings that failed and were skipped
  pub failures: usize,
}

/// Delete outbox items and cache entries older than `cutoff`.
///
/// Only records strictly before `cutoff` are removed. Every deletion is
/// attempted on its own; a failure is logged and the sweep moves on.
pub fn sweep(storage: &dyn CacheStorage, outbox: &Outbox, cutoff: DateTime<Utc>) -> CleanupReport {
  let mut report = CleanupReport::default();
  sweep_outbox(outbox, cutoff, &mut report);
  sweep_caches(storage, cutoff, &mut report);

  info!(
    outbox_removed = report.outbox_removed,
    entries_removed = report.entries_removed,
    failures = report.failures,
    "Cleanup finished"
  );
  report
}

fn sweep_outbox(outbox: &Outbox, cutoff: DateTime<Utc>, report: &mut CleanupReport) {
  let ids = match outbox.ids_enqueued_before(cutoff) {
    Ok(ids) => ids,
    Err(e) => {
      warn!(error = %e, "Failed to list expired outbox items");
      report.failures += 1;
      return;
    }
  };

  for id in ids {
    match outbox.delete(id) {
      Ok(true) => report.outbox_removed += 1,
      Ok(false) => {}
      Err(e) => {
        warn!(id, error = %e, "Failed to delete expired outbox item");
        report.failures += 1;
      }
    }
  }
}

fn sweep_caches(storage: &dyn CacheStorage, cutoff: DateTime<Utc>, report: &mut CleanupReport) {
  let names = match storage.cache_names() {
    Ok(names) => names,
    Err(e) => {
      warn!(error = %e, "Failed to list caches");
      report.failures += 1;
      return;
    }
  };

  for name in names {
    let keys = match storage.keys_stored_before(&name, cutoff) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(cache = %name, error = %e, "Failed to list expired cache entries");
        report.failures += 1;
        continue;
      }
    };

    for key in keys {
      match storage.delete(&name, &key) {
        Ok(true) => report.entries_removed += 1,
        Ok(false) => {}
        Err(e) => {
          warn!(cache = %name, key = %key, error = %e, "Failed to delete expired cache entry");
          report.failures += 1;
        }
      }
    }
  }
}
