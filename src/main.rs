mod cache;
mod config;
mod logging;
mod net;
mod offline;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use std::path::PathBuf;

use cache::{CacheNames, CacheStore, SqliteStorage};
use config::Config;
use net::{resolve, Fetcher, HttpFetcher, Request, RequestMode, Response};
use offline::{MatchMode, OfflineSynthesizer};
use worker::{
  EventOutcome, FetchRouter, LogHost, Notification, NotificationClick, NotificationData,
  ServiceWorkerState, Worker, WorkerEvent, BACKGROUND_SYNC_TAG,
};

type CliWorker = Worker<SqliteStorage, HttpFetcher, LogHost>;

#[derive(Parser, Debug)]
#[command(name = "medaid-sw")]
#[command(about = "Offline caching worker for the MedAid healthcare companion")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/medaid-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// App origin, e.g. https://medaid.example
  #[arg(short, long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache static assets, then activate (install skips waiting)
  Install,
  /// Drop cache namespaces from other versions
  Activate,
  /// Send a request through the worker
  Fetch {
    /// Absolute URL, or a path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Mark the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Request body (JSON for the chat endpoint)
    #[arg(long)]
    body: Option<String>,
    /// Extra request header, `Name: value`; may be repeated
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
  },
  /// Deliver a push message
  Push {
    /// JSON payload: {"title", "body", "data": {"id"}}
    #[arg(long)]
    payload: Option<String>,
  },
  /// Click a reminder notification
  Click {
    /// taken, snooze, or omit for a plain tap
    #[arg(long)]
    action: Option<String>,
    /// Reminder identifier
    #[arg(long)]
    id: Option<String>,
  },
  /// Fire a background sync
  Sync {
    #[arg(long, default_value = BACKGROUND_SYNC_TAG)]
    tag: String,
  },
  /// List cache namespaces and their entry counts
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    Config { origin, ..config }
  } else {
    config
  };

  let _log_guard = logging::init(&config.logging)?;

  match args.command {
    Command::Install => {
      let worker = Worker::new(build_router(&config)?, LogHost, config.precache_urls()?);
      print_outcome(worker.dispatch(WorkerEvent::Install).await?);
      print_outcome(worker.dispatch(WorkerEvent::Activate).await?);
    }
    Command::Activate => {
      let worker = resume(&config, ServiceWorkerState::Installed)?;
      print_outcome(worker.dispatch(WorkerEvent::Activate).await?);
    }
    Command::Fetch {
      url,
      method,
      navigate,
      body,
      headers,
    } => {
      let worker = resume(&config, ServiceWorkerState::Activated)?;
      let request = build_request(&config, &url, &method, navigate, body, &headers)?;

      match worker.dispatch(WorkerEvent::Fetch(request.clone())).await? {
        EventOutcome::PassThrough => {
          println!("(not intercepted)");
          print_response(&worker.router().fetcher().fetch(&request).await?);
        }
        outcome => print_outcome(outcome),
      }
    }
    Command::Push { payload } => {
      let worker = event_worker(&config)?;
      let outcome = worker
        .dispatch(WorkerEvent::Push(payload.map(String::into_bytes)))
        .await?;
      print_outcome(outcome);
    }
    Command::Click { action, id } => {
      let worker = event_worker(&config)?;
      let data = NotificationData {
        id,
        ..NotificationData::default()
      };
      let click = NotificationClick {
        notification: Notification::reminder("MedAid", "", data),
        action,
      };
      print_outcome(worker.dispatch(WorkerEvent::NotificationClick(click)).await?);
    }
    Command::Sync { tag } => {
      let worker = event_worker(&config)?;
      print_outcome(worker.dispatch(WorkerEvent::Sync { tag }).await?);
    }
    Command::Status => {
      let router = build_router(&config)?;
      let live = router.cache().names().clone();
      for (name, count) in router.cache().summary()? {
        let marker = if live.keep_set().contains(&name.as_str()) {
          "live"
        } else {
          "stale"
        };
        println!("{:<28} {:>6} entries  ({})", name, count, marker);
      }
    }
  }

  Ok(())
}

fn build_router(config: &Config) -> Result<FetchRouter<SqliteStorage, HttpFetcher>> {
  router_with(config, SqliteStorage::open(&config.database_path()?)?)
}

fn router_with(
  config: &Config,
  storage: SqliteStorage,
) -> Result<FetchRouter<SqliteStorage, HttpFetcher>> {
  let cache = CacheStore::new(
    storage,
    CacheNames::new(&config.cache.prefix, &config.cache.version),
  )
  .with_vary_headers(config.cache.vary_headers.clone());

  let match_mode = if config.offline.reply_lead_matching {
    MatchMode::KeywordsOrReplyLead
  } else {
    MatchMode::KeywordsOnly
  };
  let synthesizer =
    OfflineSynthesizer::new(&config.offline.emergency_number).with_match_mode(match_mode);

  Ok(FetchRouter::new(
    cache,
    HttpFetcher::new(config)?,
    synthesizer,
    config.offline_page_url()?,
  ))
}

/// Worker for push, click and sync: none of them read or write the cache.
fn event_worker(config: &Config) -> Result<CliWorker> {
  let router = router_with(config, SqliteStorage::open_in_memory()?)?;
  Ok(Worker::new(router, LogHost, Vec::new()))
}

fn resume(config: &Config, state: ServiceWorkerState) -> Result<CliWorker> {
  Worker::resume(
    build_router(config)?,
    LogHost,
    config.precache_urls()?,
    state,
  )
}

fn build_request(
  config: &Config,
  url: &str,
  method: &str,
  navigate: bool,
  body: Option<String>,
  headers: &[String],
) -> Result<Request> {
  let url = resolve(&config.origin_url()?, url)?;
  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

  let mut request = Request::new(method, url);
  if navigate {
    request = request.with_mode(RequestMode::Navigate);
  }
  if let Some(body) = body {
    request = request.with_body(body);
  }
  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}': expected 'Name: value'", header))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
      .map_err(|e| eyre!("Invalid header name '{}': {}", name, e))?;
    let value = HeaderValue::from_str(value.trim())
      .map_err(|e| eyre!("Invalid header value for {}: {}", name, e))?;
    request = request.with_header(name, value);
  }
  Ok(request)
}

fn print_outcome(outcome: EventOutcome) {
  match outcome {
    EventOutcome::Installed { precached } => println!("Precached {} assets", precached),
    EventOutcome::Activated(report) => {
      if report.deleted.is_empty() {
        println!("Activated; no stale caches");
      } else {
        println!("Activated; deleted {}", report.deleted.join(", "));
      }
      for (name, error) in report.failed {
        println!("  failed to delete {}: {}", name, error);
      }
    }
    EventOutcome::Response(response) => print_response(&response),
    EventOutcome::PassThrough => println!("(not intercepted)"),
    EventOutcome::NotificationShown(notification) => {
      match serde_json::to_string_pretty(&notification) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}: {}", notification.title, notification.body),
      }
    }
    EventOutcome::WindowOpened(url) => println!("Opened {}", url),
    EventOutcome::Synced => println!("Background sync complete"),
    EventOutcome::Ignored => println!("(ignored)"),
  }
}

fn print_response(response: &Response) {
  println!("{} ({:?})", response.status, response.source);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
  }
  println!();
  println!("{}", String::from_utf8_lossy(&response.body));
}
