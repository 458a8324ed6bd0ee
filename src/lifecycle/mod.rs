//! Installation, activation and page commands for one cache generation.
//!
//! A [`Worker`] owns everything the engine needs: configuration, the cache
//! store, the outbox, the network and the set of open pages. It goes through
//! `Registered → Installing → Waiting → Activating → Active` and only
//! intercepts requests once active.

mod cleanup;
mod clients;
mod messages;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use cleanup::CleanupReport;
pub use clients::Clients;
pub use messages::{CacheStatus, ClientMessage, Command, Reply};
pub use state::LifecycleState;

use crate::cache::{CacheGeneration, CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::feed;
use crate::net::{Fetcher, HttpFetcher, Request};
use crate::outbox::{Outbox, OutboxKind, ReplayReport, Replayer};
use crate::router::{Intercept, RequestInterceptor, Router};

/// Outcome of priming the cache during installation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: usize,
  pub failed: usize,
  /// Whether the article feed was fetched and stored
  pub data_cached: bool,
}

pub struct Worker {
  config: Arc<Config>,
  generation: CacheGeneration,
  storage: Arc<dyn CacheStorage>,
  outbox: Arc<Outbox>,
  fetcher: Arc<dyn Fetcher>,
  router: Router,
  replayer: Replayer,
  clients: Clients,
  state: watch::Sender<LifecycleState>,
  skip_waiting: AtomicBool,
}

impl Worker {
  pub fn new(
    config: Arc<Config>,
    storage: Arc<dyn CacheStorage>,
    outbox: Arc<Outbox>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    config.validate()?;
    let generation = config.cache_generation()?;
    let router = Router::new(config.clone(), storage.clone(), fetcher.clone())?;
    let replayer = Replayer::new(outbox.clone(), fetcher.clone(), config.clone());
    let (state, _) = watch::channel(LifecycleState::Registered);

    Ok(Self {
      skip_waiting: AtomicBool::new(config.skip_waiting),
      config,
      generation,
      storage,
      outbox,
      fetcher,
      router,
      replayer,
      clients: Clients::new(),
      state,
    })
  }

  /// Build a worker on the configured database and the real network.
  pub fn open(config: Config) -> Result<Self> {
    let path = config.database_path()?;
    info!(path = %path.display(), "Opening cache database");

    let storage = Arc::new(SqliteStorage::open(&path)?);
    let outbox = Arc::new(Outbox::open(&path)?);
    let fetcher = Arc::new(HttpFetcher::new()?);
    Self::new(Arc::new(config), storage, outbox, fetcher)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn cache_name(&self) -> String {
    self.generation.name()
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.borrow()
  }

  pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
    self.state.subscribe()
  }

  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  fn set_state(&self, state: LifecycleState) {
    let previous = self.state.send_replace(state);
    if previous != state {
      info!(cache = %self.generation, from = %previous, to = %state, "Lifecycle transition");
    }
  }

  /// Prime a fresh generation with every configured resource.
  ///
  /// Only failing to open the generation is fatal. Each resource is fetched
  /// on its own and failures are logged and counted.
  pub async fn install(&self) -> Result<InstallReport> {
    self.set_state(LifecycleState::Installing);
    let cache = self.generation.name();

    self.storage.open_cache(&cache).map_err(|e| {
      error!(cache = %cache, error = %e, "Failed to open cache generation");
      eyre!("Failed to open cache generation {}: {}", cache, e)
    })?;

    let resources = self.config.install_resources();
    let results =
      futures::future::join_all(resources.into_iter().map(|path| self.precache(&cache, path)))
        .await;

    let mut report = InstallReport::default();
    for result in results {
      match result {
        Ok(()) => report.cached += 1,
        Err(e) => {
          warn!(error = %e, "Failed to precache resource");
          report.failed += 1;
        }
      }
    }

    match self.precache_feed(&cache).await {
      Ok(()) => report.data_cached = true,
      Err(e) => warn!(path = %self.config.data_path, error = %e, "Failed to precache article feed"),
    }

    info!(
      cache = %cache,
      cached = report.cached,
      failed = report.failed,
      data = report.data_cached,
      "Install finished"
    );

    self.set_state(LifecycleState::Waiting);
    if self.skip_waiting.load(Ordering::SeqCst) {
      if let Err(e) = self.activate() {
        warn!(error = %e, "Activation after install failed");
      }
    }
    Ok(report)
  }

  async fn precache(&self, cache: &str, path: &str) -> Result<()> {
    let request = Request::get(self.config.resolve(path)?);
    let response = self.fetcher.fetch(&request).await?;
    if !response.ok() {
      return Err(eyre!("{} returned status {}", request.url, response.status));
    }
    self.storage.put(cache, &request.key(), &response)?;
    debug!(url = %request.url, "Precached");
    Ok(())
  }

  async fn precache_feed(&self, cache: &str) -> Result<()> {
    let request = Request::get(self.config.resolve(&self.config.data_path)?);
    let response = self.fetcher.fetch(&request).await?;
    if !response.ok() {
      return Err(eyre!("{} returned status {}", request.url, response.status));
    }
    feed::validate(&response.body)?;
    self.storage.put(cache, &request.key(), &response)
  }

  /// Evict every other generation and take control of open pages.
  ///
  /// If the generations cannot be listed the worker goes back to `Waiting`,
  /// so a later `SKIP_WAITING` retries.
  pub fn activate(&self) -> Result<()> {
    let previous = self.state();
    self.set_state(LifecycleState::Activating);
    let current = self.generation.name();

    let names = match self.storage.cache_names() {
      Ok(names) => names,
      Err(e) => {
        error!(error = %e, "Failed to list caches, activation postponed");
        let restored = match previous {
          LifecycleState::Active => LifecycleState::Active,
          _ => LifecycleState::Waiting,
        };
        self.set_state(restored);
        return Err(eyre!("Failed to activate {}: {}", current, e));
      }
    };

    for name in names {
      if name == current {
        continue;
      }
      if let Some(stale) = CacheGeneration::parse(&name) {
        if stale.is_newer_than(&self.generation) {
          warn!(stale = %stale, current = %self.generation, "Evicting a newer cache generation");
        }
      }
      match self.storage.delete_cache(&name) {
        Ok(_) => info!(cache = %name, "Deleted stale cache"),
        Err(e) => error!(cache = %name, error = %e, "Failed to delete stale cache"),
      }
    }

    self.clients.claim(&current);
    self.set_state(LifecycleState::Active);
    Ok(())
  }

  /// Activate as soon as installation allows it.
  pub fn skip_waiting(&self) -> Result<()> {
    self.skip_waiting.store(true, Ordering::SeqCst);
    match self.state() {
      LifecycleState::Waiting => self.activate(),
      state => {
        debug!(%state, "Skip waiting recorded");
        Ok(())
      }
    }
  }

  /// Pick up a generation installed by an earlier process.
  ///
  /// Returns false when the current generation has never been installed.
  pub fn resume(&self) -> Result<bool> {
    let current = self.generation.name();
    if !self.storage.cache_names()?.contains(&current) {
      return Ok(false);
    }
    self.clients.claim(&current);
    self.set_state(LifecycleState::Active);
    Ok(true)
  }

  /// Serve `request`, or pass it through when not active yet.
  pub async fn handle_fetch(&self, request: &Request) -> Intercept {
    if !self.state().is_active() {
      debug!(url = %request.url, state = %self.state(), "Not active, passing through");
      return Intercept::Passthrough;
    }
    self.router.route(request).await
  }

  /// Run a page command. Only `GET_CACHE_STATUS` produces a reply.
  pub async fn handle_message(&self, command: Command) -> Option<Reply> {
    debug!(?command, "Handling command");
    match command {
      Command::SkipWaiting => {
        if let Err(e) = self.skip_waiting() {
          error!(error = %e, "Skip waiting failed");
        }
        None
      }
      Command::ClearCache => {
        if let Err(e) = self.clear_all() {
          error!(error = %e, "Failed to clear caches");
        }
        None
      }
      Command::GetCacheStatus => Some(Reply::status(self.status())),
      Command::Cleanup => {
        self.cleanup();
        None
      }
    }
  }

  /// Parse and run a raw JSON command. Malformed messages are logged and dropped.
  pub async fn handle_raw(&self, message: &Value) -> Option<Reply> {
    match serde_json::from_value::<Command>(message.clone()) {
      Ok(command) => self.handle_message(command).await,
      Err(e) => {
        warn!(%message, error = %e, "Ignoring unknown command");
        None
      }
    }
  }

  /// Delete every cache generation and tell open pages.
  pub fn clear_all(&self) -> Result<usize> {
    let names = self.storage.cache_names()?;
    let mut deleted = 0;
    for name in &names {
      if self.storage.delete_cache(name)? {
        deleted += 1;
      }
    }

    info!(deleted, "Cleared all caches");
    self.clients.post_all(ClientMessage::CacheCleared {
      message: "All caches cleared".to_string(),
    });
    Ok(deleted)
  }

  /// Keys held by the current generation.
  pub fn status(&self) -> Result<CacheStatus> {
    let cache_name = self.generation.name();
    let cached_urls: Vec<String> = self
      .storage
      .keys(&cache_name)?
      .iter()
      .map(|key| key.url().to_string())
      .collect();

    Ok(CacheStatus {
      count: cached_urls.len(),
      cache_name,
      cached_urls,
    })
  }

  pub fn cleanup(&self) -> CleanupReport {
    match self.config.cleanup_cutoff(Utc::now()) {
      Ok(cutoff) => cleanup::sweep(self.storage.as_ref(), &self.outbox, cutoff),
      Err(e) => {
        error!(error = %e, "Cleanup skipped");
        CleanupReport {
          failures: 1,
          ..CleanupReport::default()
        }
      }
    }
  }

  /// Record an action for later replay, returning its id.
  pub fn enqueue(&self, kind: OutboxKind, payload: &Value) -> Result<i64> {
    let id = self.outbox.enqueue(kind, payload)?;
    info!(id, kind = %kind, "Queued offline action");
    Ok(id)
  }

  /// Background sync for a single tag.
  pub async fn sync(&self, tag: &str) -> Result<ReplayReport> {
    let kind: OutboxKind = tag.parse().map_err(|e: String| eyre!(e))?;
    self.replayer.replay(kind).await
  }

  /// Replay every queued kind.
  pub async fn connectivity_regained(&self) -> ReplayReport {
    info!("Connectivity regained, replaying outbox");
    self.replayer.replay_all().await
  }

  /// Run [`Worker::cleanup`] every `cleanup_interval`, first after one interval.
  pub fn spawn_periodic_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
    let worker = Arc::clone(self);
    let period = worker.config.cleanup_interval();

    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      loop {
        interval.tick().await;
        worker.cleanup();
      }
    })
  }
}

impl RequestInterceptor for Worker {
  fn intercept<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Intercept> {
    Box::pin(self.handle_fetch(request))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::RequestKey;
  use crate::net::Response;
  use crate::strategy::ResponseSource;
  use crate::testing::{self, MockFetcher};
  use chrono::Duration;
  use serde_json::json;
  use url::Url;

  fn worker_with(config: Config) -> (Arc<Worker>, Arc<SqliteStorage>, Arc<MockFetcher>) {
    let storage = testing::storage();
    let fetcher = MockFetcher::new();
    let outbox = Arc::new(Outbox::open_in_memory().unwrap());
    let worker = Worker::new(Arc::new(config), storage.clone(), outbox, fetcher.clone()).unwrap();
    (Arc::new(worker), storage, fetcher)
  }

  fn worker() -> (Arc<Worker>, Arc<SqliteStorage>, Arc<MockFetcher>) {
    worker_with(testing::config())
  }

  fn key(path: &str) -> RequestKey {
    RequestKey::new("GET", &Url::parse(&testing::url(path)).unwrap())
  }

  fn respond_all(fetcher: &MockFetcher, config: &Config) {
    for path in config.install_resources() {
      let url = config.resolve(path).unwrap();
      fetcher.respond(url.as_str(), 200, &format!("body of {}", path));
    }
    fetcher.respond(&testing::url("/articles.json"), 200, r#"{"articles": []}"#);
  }

  #[tokio::test]
  async fn test_install_tolerates_partial_failure() {
    let (worker, storage, fetcher) = worker();
    let config = testing::config();
    respond_all(&fetcher, &config);
    fetcher.fail(&testing::url("/style.css"));
    fetcher.respond(&testing::url("/404.html"), 500, "oops");

    let report = worker.install().await.unwrap();
    let total = config.install_resources().len();
    assert_eq!(report.failed, 2);
    assert_eq!(report.cached, total - 2);
    assert!(report.data_cached);
    assert_eq!(worker.state(), LifecycleState::Waiting);

    let cache = worker.cache_name();
    assert!(storage.get(&cache, &key("/index.html")).unwrap().is_some());
    assert!(storage.get(&cache, &key("/style.css")).unwrap().is_none());
    assert!(storage.get(&cache, &key("/articles.json")).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_install_with_malformed_feed_is_not_fatal() {
    let (worker, storage, fetcher) = worker();
    respond_all(&fetcher, &testing::config());
    fetcher.respond(&testing::url("/articles.json"), 200, "<html>");

    let report = worker.install().await.unwrap();
    assert!(!report.data_cached);
    assert!(storage
      .get(&worker.cache_name(), &key("/articles.json"))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_activation_leaves_exactly_one_generation() {
    let (worker, storage, fetcher) = worker();
    respond_all(&fetcher, &testing::config());
    storage.open_cache("muhtawaa-v0.9").unwrap();
    storage.open_cache("muhtawaa-v2.0").unwrap();
    storage.open_cache("unrelated").unwrap();

    worker.install().await.unwrap();
    worker.activate().unwrap();

    assert_eq!(storage.cache_names().unwrap(), vec![worker.cache_name()]);
    assert_eq!(worker.state(), LifecycleState::Active);
    assert_eq!(worker.clients().controller(), Some(worker.cache_name()));
  }

  #[tokio::test]
  async fn test_skip_waiting_from_config_activates_after_install() {
    let config = Config {
      skip_waiting: true,
      ..testing::config()
    };
    let (worker, _, _) = worker_with(config);

    worker.install().await.unwrap();
    assert_eq!(worker.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_skip_waiting_command_activates_waiting_worker() {
    let (worker, _, _) = worker();
    worker.install().await.unwrap();
    assert_eq!(worker.state(), LifecycleState::Waiting);

    let reply = worker
      .handle_raw(&json!({"type": "SKIP_WAITING"}))
      .await;
    assert!(reply.is_none());
    assert_eq!(worker.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_skip_waiting_before_install_short_circuits() {
    let (worker, _, _) = worker();
    worker.skip_waiting().unwrap();
    assert_eq!(worker.state(), LifecycleState::Registered);

    worker.install().await.unwrap();
    assert_eq!(worker.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_requests_pass_through_until_active() {
    let (worker, _, fetcher) = worker();
    fetcher.respond(&testing::url("/about"), 200, "about");
    let request = Request::get(Url::parse(&testing::url("/about")).unwrap());

    assert!(matches!(
      worker.handle_fetch(&request).await,
      Intercept::Passthrough
    ));

    worker.install().await.unwrap();
    worker.activate().unwrap();
    match worker.intercept(&request).await {
      Intercept::Respond(served) => assert_eq!(served.response.text(), "about"),
      Intercept::Passthrough => panic!("expected a response"),
    }
  }

  #[tokio::test]
  async fn test_offline_navigation_gets_offline_page() {
    let (worker, _, fetcher) = worker();
    fetcher.respond(&testing::url("/offline.html"), 200, "<h1>offline</h1>");
    worker.install().await.unwrap();
    worker.activate().unwrap();

    fetcher.set_offline(true);
    let request = Request::navigate(Url::parse(&testing::url("/never-visited")).unwrap());
    match worker.handle_fetch(&request).await {
      Intercept::Respond(served) => {
        assert_eq!(served.source, ResponseSource::OfflinePage);
        assert_eq!(served.response.text(), "<h1>offline</h1>");
      }
      Intercept::Passthrough => panic!("expected the offline page"),
    }
  }

  #[tokio::test]
  async fn test_status_reports_five_entries() {
    let (worker, storage, _) = worker();
    let cache = worker.cache_name();
    storage.open_cache(&cache).unwrap();
    for n in 0..5 {
      storage
        .put(&cache, &key(&format!("/page-{}.html", n)), &Response::new(200, "x"))
        .unwrap();
    }

    let reply = worker.handle_message(Command::GetCacheStatus).await.unwrap();
    match reply {
      Reply::CacheStatus {
        data: Some(status),
        error: None,
      } => {
        assert_eq!(status.count, 5);
        assert_eq!(status.cache_name, cache);
        assert_eq!(status.cached_urls.len(), 5);
        assert!(status
          .cached_urls
          .contains(&testing::url("/page-0.html")));
      }
      other => panic!("unexpected reply {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_clear_cache_notifies_pages() {
    let (worker, storage, _) = worker();
    storage.open_cache(&worker.cache_name()).unwrap();
    storage.open_cache("muhtawaa-v0.9").unwrap();
    let mut page = worker.clients().subscribe();

    worker.handle_message(Command::ClearCache).await;

    assert!(storage.cache_names().unwrap().is_empty());
    assert_eq!(
      page.try_recv().unwrap(),
      ClientMessage::CacheCleared {
        message: "All caches cleared".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_cleanup_command_removes_expired_entries() {
    let (worker, storage, _) = worker();
    let cache = worker.cache_name();
    let now = Utc::now();
    storage.open_cache(&cache).unwrap();
    storage
      .put_at(&cache, &key("/old"), &Response::new(200, "x"), now - Duration::days(8))
      .unwrap();
    storage
      .put_at(&cache, &key("/recent"), &Response::new(200, "x"), now - Duration::days(6))
      .unwrap();

    worker.handle_message(Command::Cleanup).await;

    assert!(storage.get(&cache, &key("/old")).unwrap().is_none());
    assert!(storage.get(&cache, &key("/recent")).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_sync_replays_only_its_tag() {
    let (worker, _, fetcher) = worker();
    fetcher.respond(&testing::url("/api/contact"), 200, "ok");
    fetcher.respond(&testing::url("/api/articles/interaction"), 200, "ok");

    worker
      .enqueue(OutboxKind::ContactForm, &json!({"name": "a"}))
      .unwrap();
    worker
      .enqueue(OutboxKind::ArticleInteraction, &json!({"like": 1}))
      .unwrap();

    let report = worker.sync("contact-form").await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(fetcher.calls(&testing::url("/api/articles/interaction")), 0);

    assert!(worker.sync("push").await.is_err());

    let report = worker.connectivity_regained().await;
    assert_eq!(report.sent, 1);
  }

  #[tokio::test]
  async fn test_resume_requires_installed_generation() {
    let (worker, storage, _) = worker();
    assert!(!worker.resume().unwrap());
    assert_eq!(worker.state(), LifecycleState::Registered);

    storage.open_cache(&worker.cache_name()).unwrap();
    assert!(worker.resume().unwrap());
    assert_eq!(worker.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_malformed_command_is_ignored() {
    let (worker, _, _) = worker();
    assert!(worker.handle_raw(&json!({"type": "NOPE"})).await.is_none());
    assert!(worker.handle_raw(&json!("CLEANUP")).await.is_none());
  }

  /// Storage whose cache listing can be made to fail.
  struct FlakyStorage {
    inner: SqliteStorage,
    fail_listing: AtomicBool,
  }

  impl CacheStorage for FlakyStorage {
    fn open_cache(&self, name: &str) -> Result<()> {
      self.inner.open_cache(name)
    }

    fn cache_names(&self) -> Result<Vec<String>> {
      if self.fail_listing.load(Ordering::SeqCst) {
        return Err(eyre!("database is locked"));
      }
      self.inner.cache_names()
    }

    fn delete_cache(&self, name: &str) -> Result<bool> {
      self.inner.delete_cache(name)
    }

    fn get(&self, cache: &str, key: &RequestKey) -> Result<Option<crate::cache::CachedResponse>> {
      self.inner.get(cache, key)
    }

    fn put_at(
      &self,
      cache: &str,
      key: &RequestKey,
      response: &Response,
      stored_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
      self.inner.put_at(cache, key, response, stored_at)
    }

    fn delete(&self, cache: &str, key: &RequestKey) -> Result<bool> {
      self.inner.delete(cache, key)
    }

    fn keys(&self, cache: &str) -> Result<Vec<RequestKey>> {
      self.inner.keys(cache)
    }

    fn keys_stored_before(
      &self,
      cache: &str,
      cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<RequestKey>> {
      self.inner.keys_stored_before(cache, cutoff)
    }
  }

  #[tokio::test]
  async fn test_failed_activation_returns_to_waiting_and_retries() {
    let storage = Arc::new(FlakyStorage {
      inner: SqliteStorage::open_in_memory().unwrap(),
      fail_listing: AtomicBool::new(false),
    });
    let fetcher = MockFetcher::new();
    fetcher.respond(&testing::url("/about"), 200, "about");
    let worker = Worker::new(
      Arc::new(testing::config()),
      storage.clone(),
      Arc::new(Outbox::open_in_memory().unwrap()),
      fetcher.clone(),
    )
    .unwrap();
    worker.install().await.unwrap();

    storage.fail_listing.store(true, Ordering::SeqCst);
    assert!(worker.activate().is_err());
    assert_eq!(worker.state(), LifecycleState::Waiting);

    storage.fail_listing.store(false, Ordering::SeqCst);
    worker.handle_message(Command::SkipWaiting).await;
    assert_eq!(worker.state(), LifecycleState::Active);

    let request = Request::get(Url::parse(&testing::url("/about")).unwrap());
    assert!(matches!(
      worker.handle_fetch(&request).await,
      Intercept::Respond(_)
    ));
  }

  #[tokio::test]
  async fn test_offline_page_cached_even_when_not_listed_as_essential() {
    let config = Config {
      essential_resources: vec!["/".to_string()],
      article_resources: Vec::new(),
      ..testing::config()
    };
    let (worker, storage, fetcher) = worker_with(config);
    fetcher.respond(&testing::url("/"), 200, "home");
    fetcher.respond(&testing::url("/offline.html"), 200, "<h1>offline</h1>");
    fetcher.respond(&testing::url("/404.html"), 200, "<h1>not found</h1>");

    let report = worker.install().await.unwrap();
    assert_eq!(report.cached, 3);
    assert!(storage
      .get(&worker.cache_name(), &key("/404.html"))
      .unwrap()
      .is_some());
    worker.activate().unwrap();

    fetcher.set_offline(true);
    let request = Request::navigate(Url::parse(&testing::url("/contact")).unwrap());
    match worker.handle_fetch(&request).await {
      Intercept::Respond(served) => {
        assert_eq!(served.source, ResponseSource::OfflinePage);
        assert_eq!(served.response.text(), "<h1>offline</h1>");
      }
      Intercept::Passthrough => panic!("expected the offline page"),
    }
  }

  #[test]
  fn test_invalid_config_rejected_by_worker() {
    let config = Config {
      cleanup_interval_secs: 0,
      ..testing::config()
    };
    let result = Worker::new(
      Arc::new(config),
      testing::storage(),
      Arc::new(Outbox::open_in_memory().unwrap()),
      MockFetcher::new(),
    );
    assert!(result.is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_periodic_cleanup_runs_once_per_interval() {
    let config = Config {
      cleanup_interval_secs: 60,
      ..testing::config()
    };
    let (worker, storage, _) = worker_with(config);
    let cache = worker.cache_name();
    let old = Utc::now() - Duration::days(8);
    storage.open_cache(&cache).unwrap();
    storage
      .put_at(&cache, &key("/old"), &Response::new(200, "x"), old)
      .unwrap();

    let task = worker.spawn_periodic_cleanup();

    tokio::time::sleep(std::time::Duration::from_secs(59)).await;
    assert!(storage.get(&cache, &key("/old")).unwrap().is_some());

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert!(storage.get(&cache, &key("/old")).unwrap().is_none());

    storage
      .put_at(&cache, &key("/older"), &Response::new(200, "x"), old)
      .unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    assert!(storage.get(&cache, &key("/older")).unwrap().is_none());

    task.abort();
  }

  #[tokio::test]
  async fn test_state_changes_are_observable() {
    let (worker, _, _) = worker();
    let mut states = worker.watch_state();
    assert_eq!(*states.borrow(), LifecycleState::Registered);

    worker.install().await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), LifecycleState::Waiting);

    worker.activate().unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow(), LifecycleState::Active);
  }
}
