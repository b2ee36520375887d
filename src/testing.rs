//! Test doubles for the network and the host runtime.

use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::net::{Fetcher, Request, Response};
use crate::worker::{Notification, WorkerHost};

/// Fetcher with scripted responses. Unknown URLs fail like an unreachable network.
#[derive(Default)]
pub struct MockFetcher {
  routes: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn offline() -> Self {
    let fetcher = Self::new();
    fetcher.set_offline(true);
    fetcher
  }

  pub fn respond(&self, url: &str, status: StatusCode, body: impl Into<Vec<u8>>) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), (status, body.into()));
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of fetches attempted so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    tokio::task::yield_now().await;

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }

    let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
    match route {
      Some((status, body)) => Ok(Response::new(status, body)),
      None => Err(eyre!("connection refused: {}", request.url)),
    }
  }
}

/// Host that records every capability call in order.
#[derive(Default)]
pub struct RecordingHost {
  calls: Mutex<Vec<String>>,
}

impl RecordingHost {
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: String) {
    self.calls.lock().unwrap().push(call);
  }
}

impl WorkerHost for RecordingHost {
  async fn skip_waiting(&self) -> Result<()> {
    self.record("skip_waiting".to_string());
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    self.record("claim_clients".to_string());
    Ok(())
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.record(format!("show:{}", notification.title));
    Ok(())
  }

  async fn close_notification(&self, notification: &Notification) -> Result<()> {
    self.record(format!("close:{}", notification.title));
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    self.record(format!("open:{}", url));
    Ok(())
  }
}
