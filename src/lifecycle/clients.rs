use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::messages::ClientMessage;

/// The set of open pages the worker can control and notify.
pub struct Clients {
  tx: broadcast::Sender<ClientMessage>,
  controller: RwLock<Option<String>>,
}

impl Clients {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(16);
    Self {
      tx,
      controller: RwLock::new(None),
    }
  }

  /// Register a page; it receives every broadcast sent after this call.
  pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
    self.tx.subscribe()
  }

  /// Take control of all open pages for `cache_name` without a reload.
  pub fn claim(&self, cache_name: &str) {
    if let Ok(mut controller) = self.controller.write() {
      *controller = Some(cache_name.to_string());
    }
    info!(cache = cache_name, pages = self.tx.receiver_count(), "Claimed open pages");
  }

  /// Cache generation currently controlling the pages.
  pub fn controller(&self) -> Option<String> {
    self.controller.read().ok().and_then(|c| c.clone())
  }

  pub fn post_all(&self, message: ClientMessage) {
    match self.tx.send(message) {
      Ok(n) => debug!(pages = n, "Broadcast sent"),
      Err(_) => debug!("Broadcast dropped, no open pages"),
    }
  }
}

impl Default for Clients {
  fn default() -> Self {
    Self::new()
  }
}
