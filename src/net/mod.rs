//! Network-facing types: intercepted requests, buffered responses and the fetcher seam.

mod fetcher;
mod request;

pub use fetcher::{Fetcher, HttpFetcher};
pub use request::{Request, RequestMode, Response};
