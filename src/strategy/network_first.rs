use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;

use super::{Served, Strategies};
use crate::net::Request;

impl Strategies {
  /// Network bounded by `timeout`; on timeout or failure, the cached entry.
  ///
  /// Dropping the timed-out future abandons the in-flight fetch.
  pub(super) async fn network_first(&self, request: &Request, timeout: Duration) -> Result<Served> {
    let key = request.key();

    let error = match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
      Ok(Ok(response)) => {
        self.store(&key, &response);
        return Ok(Served::network(response));
      }
      Ok(Err(e)) => e,
      Err(_) => eyre!(
        "Timed out after {}ms fetching {}",
        timeout.as_millis(),
        request.url
      ),
    };

    debug!(url = %request.url, error = %error, "Network failed, trying cache");
    match self.lookup(&key) {
      Some(response) => Ok(Served::cache(response)),
      None => Err(error),
    }
  }
}
