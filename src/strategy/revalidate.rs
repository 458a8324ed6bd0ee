use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::debug;

use super::{store, Served, Strategies};
use crate::cache::CacheStorage;
use crate::net::{Fetcher, Request, Response};

impl Strategies {
  /// Cached entry immediately while a background fetch refreshes it.
  ///
  /// The background fetch is spawned before the cache answer is returned and
  /// keeps running after it; on a miss the caller waits for it instead.
  pub(super) async fn stale_while_revalidate(&self, request: &Request) -> Result<Served> {
    let key = request.key();
    let cached = self.lookup(&key);

    let revalidation = tokio::spawn(revalidate(
      Arc::clone(&self.storage),
      Arc::clone(&self.fetcher),
      self.cache_name.clone(),
      request.clone(),
    ));

    match cached {
      Some(response) => Ok(Served::cache(response)),
      None => {
        let response = revalidation
          .await
          .map_err(|e| eyre!("Revalidation task failed: {}", e))??;
        Ok(Served::network(response))
      }
    }
  }
}

async fn revalidate(
  storage: Arc<dyn CacheStorage>,
  fetcher: Arc<dyn Fetcher>,
  cache_name: String,
  request: Request,
) -> Result<Response> {
  match fetcher.fetch(&request).await {
    Ok(response) => {
      store(storage.as_ref(), &cache_name, &request.key(), &response);
      Ok(response)
    }
    Err(e) => {
      debug!(url = %request.url, error = %e, "Background fetch failed");
      Err(e)
    }
  }
}
