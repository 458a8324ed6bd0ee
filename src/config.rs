use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheGeneration;
use crate::outbox::OutboxKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the site the engine serves (e.g. "https://example.com")
  pub origin: String,
  /// Cache generation name prefix
  pub cache_prefix: String,
  /// Cache generation version, MAJOR.MINOR
  pub version: String,
  /// External origins whose requests are still intercepted (font delivery)
  pub allowed_origins: Vec<String>,
  /// Page served to navigations when nothing better is available
  pub offline_page: String,
  /// Always cached on install alongside the offline page
  pub error_page: String,
  /// Path of the dynamic article feed
  pub data_path: String,
  /// Path prefix of article pages (stale-while-revalidate)
  pub articles_prefix: String,
  /// Resources cached on install; paths are resolved against `origin`
  pub essential_resources: Vec<String>,
  pub article_resources: Vec<String>,
  /// Extensions treated as static assets (cache-first)
  pub static_extensions: Vec<String>,
  pub navigation_timeout_ms: u64,
  pub default_timeout_ms: u64,
  /// Age after which cached entries and outbox items are discarded
  pub max_age_days: i64,
  pub cleanup_interval_secs: u64,
  /// Activate right after install instead of waiting for SKIP_WAITING
  pub skip_waiting: bool,
  /// Database file (default: $XDG_DATA_HOME/offline-cache/cache.db)
  pub database: Option<PathBuf>,
  pub endpoints: EndpointsConfig,
}

/// Replay targets for queued offline actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
  pub contact_form: String,
  pub article_interaction: String,
}

impl Default for EndpointsConfig {
  fn default() -> Self {
    Self {
      contact_form: "/api/contact".to_string(),
      article_interaction: "/api/articles/interaction".to_string(),
    }
  }
}

impl EndpointsConfig {
  pub fn for_kind(&self, kind: OutboxKind) -> &str {
    match kind {
      OutboxKind::ContactForm => &self.contact_form,
      OutboxKind::ArticleInteraction => &self.article_interaction,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      cache_prefix: "muhtawaa".to_string(),
      version: "1.0".to_string(),
      allowed_origins: strings(&["https://fonts.googleapis.com", "https://fonts.gstatic.com"]),
      offline_page: "/offline.html".to_string(),
      error_page: "/404.html".to_string(),
      data_path: "/articles.json".to_string(),
      articles_prefix: "/articles/".to_string(),
      essential_resources: strings(&[
        "/",
        "/index.html",
        "/style.css",
        "/styles-enhanced.css",
        "/script.js",
        "/offline.html",
        "/404.html",
        "https://fonts.googleapis.com/css2?family=Cairo:wght@300;400;600;700&display=swap",
      ]),
      article_resources: strings(&[
        "/articles/ai-future-work.html",
        "/articles/water-benefits.html",
        "/articles/arab-heritage.html",
        "/articles/time-management.html",
        "/articles/climate-change.html",
        "/articles/cybersecurity.html",
        "/articles/healthy-cooking.html",
        "/articles/sports-mental-health.html",
        "/articles/investment-beginners.html",
      ]),
      static_extensions: strings(&[
        "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf",
        "eot",
      ]),
      navigation_timeout_ms: 3000,
      default_timeout_ms: 5000,
      max_age_days: 7,
      cleanup_interval_secs: 3600,
      skip_waiting: false,
      database: None,
      endpoints: EndpointsConfig::default(),
    }
  }
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-cache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offline-cache/config.yaml\n\
                 or pass --origin to run with defaults."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;
    Ok(config)
  }

  /// Check the fields that are parsed lazily elsewhere.
  pub fn validate(&self) -> Result<()> {
    self.origin_url()?;
    self.cache_generation()?;
    if self.max_age_days <= 0 {
      return Err(eyre!("max_age_days must be positive"));
    }
    self.cleanup_cutoff(chrono::Utc::now())?;
    if self.cleanup_interval_secs == 0 {
      return Err(eyre!("cleanup_interval_secs must be positive"));
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a configured path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid resource '{}': {}", path, e))
  }

  pub fn cache_generation(&self) -> Result<CacheGeneration> {
    CacheGeneration::new(&self.cache_prefix, &self.version)
  }

  pub fn navigation_timeout(&self) -> Duration {
    Duration::from_millis(self.navigation_timeout_ms)
  }

  pub fn default_timeout(&self) -> Duration {
    Duration::from_millis(self.default_timeout_ms)
  }

  pub fn max_age(&self) -> Result<chrono::Duration> {
    chrono::Duration::try_days(self.max_age_days)
      .ok_or_else(|| eyre!("max_age_days out of range: {}", self.max_age_days))
  }

  /// Records stored strictly before the returned instant are expired.
  pub fn cleanup_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now
      .checked_sub_signed(self.max_age()?)
      .ok_or_else(|| eyre!("max_age_days out of range: {}", self.max_age_days))
  }

  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs)
  }

  /// Everything primed on install: essential and article resources plus the
  /// offline and error pages, without duplicates.
  pub fn install_resources(&self) -> Vec<&str> {
    let mut resources: Vec<&str> = Vec::new();
    let all = self
      .essential_resources
      .iter()
      .chain(self.article_resources.iter())
      .chain([&self.offline_page, &self.error_page]);
    for resource in all {
      if !resources.contains(&resource.as_str()) {
        resources.push(resource.as_str());
      }
    }
    resources
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::db::default_path(),
    }
  }

  /// Whether requests to `url`'s origin are intercepted at all.
  pub fn is_intercepted_origin(&self, url: &Url) -> bool {
    let origin = url.origin().ascii_serialization();
    let same = self
      .origin_url()
      .map(|o| o.origin().ascii_serialization() == origin)
      .unwrap_or(false);

    same
      || self
        .allowed_origins
        .iter()
        .any(|allowed| allowed.trim_end_matches('/') == origin)
  }
}
