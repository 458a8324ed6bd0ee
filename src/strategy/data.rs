use color_eyre::{eyre::eyre, Result};
use tracing::warn;

use super::{ResponseSource, Served, Strategies};
use crate::feed;
use crate::net::Request;

impl Strategies {
  /// Always asks the network first, bypassing intermediate HTTP caches.
  ///
  /// A non-OK status or a malformed feed counts as a network failure. When
  /// neither the network nor the cache can answer, the placeholder feed is
  /// served so the page never receives an absent or malformed payload.
  pub(super) async fn network_first_for_data(&self, request: &Request) -> Result<Served> {
    let request = request
      .clone()
      .with_header("Cache-Control", "no-cache")
      .with_header("Pragma", "no-cache");
    let key = request.key();

    let error = match self.fetcher.fetch(&request).await {
      Ok(response) if response.ok() => match feed::validate(&response.body) {
        Ok(()) => {
          self.store(&key, &response);
          return Ok(Served::network(response));
        }
        Err(e) => e,
      },
      Ok(response) => eyre!("Feed request returned status {}", response.status),
      Err(e) => e,
    };

    warn!(url = %request.url, error = %error, "Feed unavailable from network");

    if let Some(response) = self.lookup(&key) {
      return Ok(Served::cache(response));
    }

    warn!(url = %request.url, "No cached feed, serving placeholder");
    Ok(Served::new(
      feed::placeholder_response()?,
      ResponseSource::Placeholder,
    ))
  }
}
