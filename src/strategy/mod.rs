//! Retrieval strategies.
//!
//! Each strategy resolves a single request against the current cache
//! generation and the network, with a different freshness/availability
//! trade-off:
//!
//! | Strategy | Network ok | Network down |
//! |----------|------------|--------------|
//! | `NetworkFirst` | store + return live | cached entry, else error |
//! | `CacheFirst` | only used on a miss | cached entry, else error |
//! | `StaleWhileRevalidate` | refreshes in background | cached entry, else error |
//! | `NetworkFirstForData` | validate, store + return | cached entry, else placeholder |
//!
//! A strategy only returns `Err` when nothing can be served; the router then
//! applies its offline fallback.

mod cache_first;
mod data;
mod network_first;
mod revalidate;

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, RequestKey};
use crate::net::{Fetcher, Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network bounded by `timeout`, falling back to the cache
  NetworkFirst { timeout: Duration },
  /// Cache if present, network only on a miss
  CacheFirst,
  /// Cache immediately, refresh the entry in the background
  StaleWhileRevalidate,
  /// Network with cache-defeating headers, then cache, then a placeholder feed
  NetworkFirstForData,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live network response
  Network,
  /// Entry from the current cache generation
  Cache,
  /// Built-in placeholder feed
  Placeholder,
  /// Cached offline page served for a failed navigation
  OfflinePage,
  /// Minimal response synthesized when nothing else was available
  Synthesized,
}

/// A response together with its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  pub fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }

  fn network(response: Response) -> Self {
    Self::new(response, ResponseSource::Network)
  }

  fn cache(response: Response) -> Self {
    Self::new(response, ResponseSource::Cache)
  }
}

/// Runs strategies against one cache generation.
#[derive(Clone)]
pub struct Strategies {
  storage: Arc<dyn CacheStorage>,
  fetcher: Arc<dyn Fetcher>,
  cache_name: String,
}

impl Strategies {
  pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, cache_name: String) -> Self {
    Self {
      storage,
      fetcher,
      cache_name,
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub async fn execute(&self, strategy: Strategy, request: &Request) -> Result<Served> {
    match strategy {
      Strategy::NetworkFirst { timeout } => self.network_first(request, timeout).await,
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
      Strategy::NetworkFirstForData => self.network_first_for_data(request).await,
    }
  }

  /// Direct read from the current generation, without touching the network.
  pub fn cached(&self, key: &RequestKey) -> Result<Option<Response>> {
    Ok(self.storage.get(&self.cache_name, key)?.map(|e| e.response))
  }

  /// Cache lookup where a storage error counts as a miss.
  fn lookup(&self, key: &RequestKey) -> Option<Response> {
    lookup(self.storage.as_ref(), &self.cache_name, key)
  }

  fn store(&self, key: &RequestKey, response: &Response) {
    store(self.storage.as_ref(), &self.cache_name, key, response)
  }
}

fn lookup(storage: &dyn CacheStorage, cache: &str, key: &RequestKey) -> Option<Response> {
  match storage.get(cache, key) {
    Ok(entry) => entry.map(|e| e.response),
    Err(e) => {
      warn!(key = %key, error = %e, "Cache read failed");
      None
    }
  }
}

/// Best-effort write: only OK responses are stored, and a failed write is
/// logged rather than surfaced.
fn store(storage: &dyn CacheStorage, cache: &str, key: &RequestKey, response: &Response) {
  if !response.ok() {
    debug!(key = %key, status = response.status, "Not caching non-OK response");
    return;
  }
  if let Err(e) = storage.put(cache, key, response) {
    warn!(key = %key, error = %e, "Cache write failed");
  }
}
