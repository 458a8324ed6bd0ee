use color_eyre::Result;
use tracing::warn;

use super::{Served, Strategies};
use crate::net::Request;

impl Strategies {
  /// Cached entry if present; the network is only consulted on a miss.
  pub(super) async fn cache_first(&self, request: &Request) -> Result<Served> {
    let key = request.key();

    if let Some(response) = self.lookup(&key) {
      return Ok(Served::cache(response));
    }

    let response = self.fetcher.fetch(request).await.map_err(|e| {
      warn!(url = %request.url, error = %e, "Failed to fetch");
      e
    })?;

    self.store(&key, &response);
    Ok(Served::network(response))
  }
}
