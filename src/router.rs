//! Per-request classification and dispatch.

use std::sync::Arc;

use color_eyre::Result;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::{CacheStorage, RequestKey};
use crate::config::Config;
use crate::net::{Fetcher, Request, Response};
use crate::strategy::{ResponseSource, Served, Strategies, Strategy};

/// Outcome of intercepting one request.
#[derive(Debug, Clone)]
pub enum Intercept {
  /// Not handled; the host performs the request itself
  Passthrough,
  /// Answered by the engine
  Respond(Served),
}

/// Single dispatch point invoked for every outbound request from the page.
pub trait RequestInterceptor: Send + Sync {
  fn intercept<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Intercept>;
}

/// Classifies requests by URL shape and runs the matching strategy.
///
/// Classification is recomputed for every request; nothing about a previous
/// decision is remembered.
#[derive(Clone)]
pub struct Router {
  config: Arc<Config>,
  strategies: Strategies,
  offline_key: RequestKey,
}

impl Router {
  pub fn new(
    config: Arc<Config>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    let cache_name = config.cache_generation()?.name();
    let offline_key = Request::get(config.resolve(&config.offline_page)?).key();

    Ok(Self {
      strategies: Strategies::new(storage, fetcher, cache_name),
      config,
      offline_key,
    })
  }

  /// Pick the strategy for `request`, or `None` to leave it alone.
  pub fn classify(&self, request: &Request) -> Option<Strategy> {
    if !request.is_read() || !self.config.is_intercepted_origin(&request.url) {
      return None;
    }

    let path = request.url.path();

    let strategy = if request.is_navigation() || path == "/" {
      Strategy::NetworkFirst {
        timeout: self.config.navigation_timeout(),
      }
    } else if path == self.config.data_path {
      Strategy::NetworkFirstForData
    } else if self.is_static_asset(&request.url) {
      Strategy::CacheFirst
    } else if path.starts_with(&self.config.articles_prefix) {
      Strategy::StaleWhileRevalidate
    } else {
      Strategy::NetworkFirst {
        timeout: self.config.default_timeout(),
      }
    };

    Some(strategy)
  }

  pub async fn route(&self, request: &Request) -> Intercept {
    let strategy = match self.classify(request) {
      Some(strategy) => strategy,
      None => return Intercept::Passthrough,
    };
    debug!(url = %request.url, ?strategy, "Routing request");

    match self.strategies.execute(strategy, request).await {
      Ok(served) => Intercept::Respond(served),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Request failed, serving offline fallback");
        Intercept::Respond(self.fallback(request))
      }
    }
  }

  fn is_static_asset(&self, url: &Url) -> bool {
    let file = match url.path_segments().and_then(|mut s| s.next_back()) {
      Some(file) => file,
      None => return false,
    };
    match file.rsplit_once('.') {
      Some((_, ext)) => self
        .config
        .static_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(ext)),
      None => false,
    }
  }

  /// Last resort once every strategy path has failed.
  fn fallback(&self, request: &Request) -> Served {
    if !request.is_navigation() {
      return Served::new(
        Response::new(503, "Network error").with_header("Content-Type", "text/plain"),
        ResponseSource::Synthesized,
      );
    }

    match self.strategies.cached(&self.offline_key) {
      Ok(Some(page)) => return Served::new(page, ResponseSource::OfflinePage),
      Ok(None) => warn!(page = %self.config.offline_page, "Offline page missing from cache"),
      Err(e) => error!(page = %self.config.offline_page, error = %e, "Failed to read offline page"),
    }

    Served::new(
      Response::new(503, "Offline").with_header("Content-Type", "text/plain; charset=utf-8"),
      ResponseSource::Synthesized,
    )
  }
}
