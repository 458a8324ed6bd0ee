//! Scripted network for unit tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::SqliteStorage;
use crate::config::Config;
use crate::net::{Fetcher, Request, Response};

#[derive(Clone)]
enum Reply {
  Respond(Response),
  Fail,
}

/// Fetcher answering from a fixed URL → reply table.
///
/// Unknown URLs get a 404. `set_offline(true)` makes every fetch fail.
#[derive(Default)]
pub struct MockFetcher {
  replies: Mutex<HashMap<String, Reply>>,
  delays: Mutex<HashMap<String, Duration>>,
  requests: Mutex<Vec<Request>>,
  offline: AtomicBool,
}

impl MockFetcher {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) {
    self.respond_with(url, Response::new(status, body));
  }

  pub fn respond_with(&self, url: &str, response: Response) {
    self
      .replies
      .lock()
      .unwrap()
      .insert(url.to_string(), Reply::Respond(response));
  }

  pub fn fail(&self, url: &str) {
    self
      .replies
      .lock()
      .unwrap()
      .insert(url.to_string(), Reply::Fail);
  }

  pub fn delay(&self, url: &str, delay: Duration) {
    self.delays.lock().unwrap().insert(url.to_string(), delay);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self, url: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

impl Fetcher for MockFetcher {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(async move {
      self.requests.lock().unwrap().push(request.clone());

      let url = request.url.as_str().to_string();
      let delay = self.delays.lock().unwrap().get(&url).copied();
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }

      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("network unreachable: {}", url));
      }

      let reply = self.replies.lock().unwrap().get(&url).cloned();
      match reply {
        Some(Reply::Respond(response)) => Ok(response),
        Some(Reply::Fail) => Err(eyre!("connection reset: {}", url)),
        None => Ok(Response::new(404, "Not Found")),
      }
    })
  }
}

pub const ORIGIN: &str = "http://localhost:8080";

pub fn url(path: &str) -> String {
  format!("{}{}", ORIGIN, path)
}

pub fn config() -> Config {
  Config {
    origin: ORIGIN.to_string(),
    ..Config::default()
  }
}

pub fn storage() -> Arc<SqliteStorage> {
  Arc::new(SqliteStorage::open_in_memory().unwrap())
}
