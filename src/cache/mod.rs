//! Durable response cache for offline support.
//!
//! This module provides the storage side of the engine:
//! - Requests are identified by method + normalized URL
//! - Responses live in named, versioned generations (`prefix-vMAJOR.MINOR`)
//! - Every entry records when it was stored so age-based cleanup is deterministic

mod generation;
mod key;
mod storage;

pub use generation::CacheGeneration;
pub use key::RequestKey;
pub use storage::{CacheStorage, CachedResponse, SqliteStorage};
