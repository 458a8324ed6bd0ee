use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use offline_cache::config::Config;
use offline_cache::lifecycle::{Reply, Worker};
use offline_cache::logging;
use offline_cache::net::{Fetcher, HttpFetcher, Request, Response};
use offline_cache::outbox::OutboxKind;
use offline_cache::router::Intercept;

#[derive(Parser, Debug)]
#[command(name = "offline-cache")]
#[command(about = "Offline request-interception and caching engine")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Site origin, overrides the config file
  #[arg(short, long, global = true)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Prime the current cache generation
  Install,
  /// Evict other generations and start serving
  Activate,
  /// Route one request through the engine and print the body
  Fetch {
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Print the current generation's contents as JSON
  Status,
  /// Delete every cache generation
  Clear,
  /// Remove cache entries and queued actions past their max age
  Cleanup,
  /// Queue an action for later replay
  Enqueue {
    /// contact-form or article-interaction
    kind: OutboxKind,
    /// JSON payload
    payload: String,
  },
  /// Replay queued actions, all kinds unless one is given
  Sync { kind: Option<OutboxKind> },
  /// Install, activate and answer JSON commands read from stdin
  Run,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = load_config(args.config.as_deref(), args.origin)?;

  let _guard = if matches!(args.command, Cmd::Run) {
    let log_dir = config
      .database_path()?
      .parent()
      .map(|p| p.join("logs"))
      .ok_or_else(|| eyre!("Could not determine log directory"))?;
    Some(logging::init_with_file(&log_dir)?)
  } else {
    logging::init_stderr()?;
    None
  };

  let worker = Worker::open(config)?;

  match args.command {
    Cmd::Install => {
      let report = worker.install().await?;
      println!(
        "Installed {}: {} cached, {} failed, feed {}",
        worker.cache_name(),
        report.cached,
        report.failed,
        if report.data_cached { "cached" } else { "missing" }
      );
    }
    Cmd::Activate => {
      worker.activate()?;
      println!("Active: {}", worker.cache_name());
    }
    Cmd::Fetch { url, navigate } => {
      if !worker.resume()? {
        warn!(cache = %worker.cache_name(), "Cache generation not installed");
      }
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      };

      let response = match worker.handle_fetch(&request).await {
        Intercept::Respond(served) => {
          eprintln!("{} ({:?})", served.response.status, served.source);
          served.response
        }
        Intercept::Passthrough => {
          eprintln!("Not intercepted, fetching directly");
          HttpFetcher::new()?.fetch(&request).await?
        }
      };
      print_body(&response);
    }
    Cmd::Status => print_json(&Reply::status(worker.status()))?,
    Cmd::Clear => {
      let deleted = worker.clear_all()?;
      println!("Deleted {} cache(s)", deleted);
    }
    Cmd::Cleanup => {
      let report = worker.cleanup();
      println!(
        "Removed {} cache entries, {} queued actions ({} failures)",
        report.entries_removed, report.outbox_removed, report.failures
      );
    }
    Cmd::Enqueue { kind, payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let id = worker.enqueue(kind, &payload)?;
      println!("Queued {} action #{}", kind, id);
    }
    Cmd::Sync { kind } => {
      let report = match kind {
        Some(kind) => worker.sync(kind.as_str()).await?,
        None => worker.connectivity_regained().await,
      };
      println!(
        "Sent {}, failed {}, skipped {}",
        report.sent, report.failed, report.skipped
      );
    }
    Cmd::Run => run(worker).await?,
  }

  Ok(())
}

fn load_config(path: Option<&std::path::Path>, origin: Option<String>) -> Result<Config> {
  let config = match (Config::load(path), origin) {
    (Ok(config), Some(origin)) => Config { origin, ..config },
    (Ok(config), None) => config,
    // With an explicit origin the defaults are enough.
    (Err(_), Some(origin)) if path.is_none() => Config {
      origin,
      ..Config::default()
    },
    (Err(e), _) => return Err(e),
  };
  config.validate()?;
  Ok(config)
}

/// Long-lived mode: one JSON command per stdin line, replies and page
/// broadcasts as JSON lines on stdout.
async fn run(worker: Worker) -> Result<()> {
  let worker = Arc::new(worker);

  worker.install().await?;
  if !worker.state().is_active() {
    if let Err(e) = worker.activate() {
      warn!(error = %e, "Activation failed, send SKIP_WAITING to retry");
    }
  }
  let cleanup = worker.spawn_periodic_cleanup();

  let mut broadcasts = worker.clients().subscribe();
  let forward = tokio::spawn(async move {
    loop {
      match broadcasts.recv().await {
        Ok(message) => {
          if let Err(e) = print_json(&message) {
            warn!(error = %e, "Failed to print broadcast");
          }
        }
        Err(broadcast::error::RecvError::Lagged(n)) => warn!(missed = n, "Broadcasts dropped"),
        Err(broadcast::error::RecvError::Closed) => break,
      }
    }
  });

  info!(cache = %worker.cache_name(), "Ready for commands on stdin");
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read stdin: {}", e))?
  {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let message: serde_json::Value = match serde_json::from_str(line) {
      Ok(message) => message,
      Err(e) => {
        warn!(error = %e, "Ignoring malformed command line");
        continue;
      }
    };

    let worker = Arc::clone(&worker);
    tokio::spawn(async move {
      if let Some(reply) = worker.handle_raw(&message).await {
        if let Err(e) = print_json(&reply) {
          warn!(error = %e, "Failed to print reply");
        }
      }
    });
  }

  info!("Stdin closed, shutting down");
  cleanup.abort();
  forward.abort();
  Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  let line = serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize: {}", e))?;
  println!("{}", line);
  Ok(())
}

fn print_body(response: &Response) {
  println!("{}", response.text());
}
