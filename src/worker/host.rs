use color_eyre::Result;
use std::future::Future;
use tracing::info;

use super::notification::Notification;

/// Capabilities of the runtime hosting the worker.
pub trait WorkerHost: Send + Sync {
  /// Replace any previously running worker without waiting for its pages to close.
  fn skip_waiting(&self) -> impl Future<Output = Result<()>> + Send;

  /// Take control of every open app page without a reload.
  fn claim_clients(&self) -> impl Future<Output = Result<()>> + Send;

  fn show_notification(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send;

  fn close_notification(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send;

  /// Open the app at `url`, or focus it if already open.
  fn open_window(&self, url: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Host for the command-line runner: there are no pages or notification
/// centre, so every capability is logged.
#[derive(Debug, Default, Clone)]
pub struct LogHost;

impl WorkerHost for LogHost {
  async fn skip_waiting(&self) -> Result<()> {
    info!("Skip waiting");
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    info!("Claiming clients");
    Ok(())
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, body = %notification.body, "Showing notification");
    Ok(())
  }

  async fn close_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "Closing notification");
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    info!(url, "Opening window");
    Ok(())
  }
}
