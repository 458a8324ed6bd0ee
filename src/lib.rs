//! Request-interception and caching engine for an offline-capable content site.
//!
//! Sits between a page and the network. Every outbound read is classified by
//! the [`router::Router`] and answered from a durable, versioned cache, the
//! network, or both. Actions taken while offline go to the [`outbox`] and are
//! replayed when connectivity returns. The [`lifecycle::Worker`] ties it all
//! together.

pub mod cache;
pub mod config;
pub mod db;
pub mod feed;
pub mod lifecycle;
pub mod logging;
pub mod net;
pub mod outbox;
pub mod router;
pub mod strategy;

#[cfg(test)]
mod testing;
