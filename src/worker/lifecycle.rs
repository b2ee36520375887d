//! Worker lifecycle state machine and event routing.

use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use super::host::WorkerHost;
use super::notification::{Notification, NotificationClick};
use super::router::FetchRouter;
use crate::cache::{CacheStorage, PruneReport};
use crate::net::{Fetcher, Request, Response};

/// Sync tag that flushes actions queued while offline.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Service worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceWorkerState {
  /// Constructed, nothing cached yet
  Parsed,
  /// Precaching in progress
  Installing,
  /// Precache complete, waiting to activate
  Installed,
  /// Pruning stale namespaces
  Activating,
  /// Controlling pages and intercepting fetches
  Activated,
  /// Install failed
  Redundant,
}

impl std::fmt::Display for ServiceWorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ServiceWorkerState::Parsed => write!(f, "parsed"),
      ServiceWorkerState::Installing => write!(f, "installing"),
      ServiceWorkerState::Installed => write!(f, "installed"),
      ServiceWorkerState::Activating => write!(f, "activating"),
      ServiceWorkerState::Activated => write!(f, "activated"),
      ServiceWorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

/// Events delivered to the worker by its runtime.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Push message; `None` when it carried no payload
  Push(Option<Vec<u8>>),
  NotificationClick(NotificationClick),
  Sync { tag: String },
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
  Installed { precached: usize },
  Activated(PruneReport),
  Response(Response),
  /// Not intercepted; the runtime's default networking applies
  PassThrough,
  NotificationShown(Notification),
  WindowOpened(String),
  Synced,
  /// Event carried nothing for this worker
  Ignored,
}

/// Long-lived worker context shared by every event.
///
/// `dispatch` takes `&self`, so independent events may run concurrently; the
/// state lock is never held across an await.
pub struct Worker<S: CacheStorage, F: Fetcher, H: WorkerHost> {
  router: FetchRouter<S, F>,
  host: H,
  precache: Vec<Url>,
  state: Mutex<ServiceWorkerState>,
}

impl<S: CacheStorage, F: Fetcher, H: WorkerHost> Worker<S, F, H> {
  pub fn new(router: FetchRouter<S, F>, host: H, precache: Vec<Url>) -> Self {
    Self {
      router,
      host,
      precache,
      state: Mutex::new(ServiceWorkerState::Parsed),
    }
  }

  /// Rebuild a worker that was installed (and possibly activated) by an
  /// earlier process, using what is already in storage.
  ///
  /// Fails unless every precache asset is in the static namespace, so a worker
  /// whose install never completed cannot be activated.
  pub fn resume(
    router: FetchRouter<S, F>,
    host: H,
    precache: Vec<Url>,
    state: ServiceWorkerState,
  ) -> Result<Self> {
    if !matches!(
      state,
      ServiceWorkerState::Installed | ServiceWorkerState::Activated
    ) {
      return Err(eyre!("Cannot resume a worker in state {}", state));
    }

    let cache = router.cache();
    if !cache.is_precached(&precache)? {
      return Err(eyre!(
        "Static cache {} is incomplete; run install first",
        cache.static_namespace()
      ));
    }

    Ok(Self {
      router,
      host,
      precache,
      state: Mutex::new(state),
    })
  }

  pub fn state(&self) -> ServiceWorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn router(&self) -> &FetchRouter<S, F> {
    &self.router
  }

  fn set_state(&self, state: ServiceWorkerState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  /// Move to `to` if the current state is one of `from`.
  fn transition(&self, from: &[ServiceWorkerState], to: ServiceWorkerState) -> Result<()> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let current = *state;
    if !from.contains(&current) {
      return Err(eyre!("Invalid lifecycle transition {} -> {}", current, to));
    }
    info!(from = %current, to = %to, "Worker state changed");
    *state = to;
    Ok(())
  }

  /// Handle one event. Resolves only once all of the event's work is done.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    match event {
      WorkerEvent::Install => self.install().await,
      WorkerEvent::Activate => self.activate().await,
      WorkerEvent::Fetch(request) => Ok(self.fetch(&request).await),
      WorkerEvent::Push(payload) => self.push(payload).await,
      WorkerEvent::NotificationClick(click) => self.notification_click(click).await,
      WorkerEvent::Sync { tag } => self.sync(&tag).await,
    }
  }

  async fn install(&self) -> Result<EventOutcome> {
    self.transition(
      &[ServiceWorkerState::Parsed, ServiceWorkerState::Redundant],
      ServiceWorkerState::Installing,
    )?;
    info!("Installing");

    let result = async {
      let precached = self
        .router
        .cache()
        .initialize_static(self.router.fetcher(), &self.precache)
        .await?;
      self.host.skip_waiting().await?;
      Ok::<_, color_eyre::Report>(precached)
    }
    .await;

    match result {
      Ok(precached) => {
        self.set_state(ServiceWorkerState::Installed);
        Ok(EventOutcome::Installed { precached })
      }
      Err(e) => {
        warn!(error = %e, "Install failed");
        self.set_state(ServiceWorkerState::Redundant);
        Err(e)
      }
    }
  }

  async fn activate(&self) -> Result<EventOutcome> {
    self.transition(
      &[ServiceWorkerState::Installed],
      ServiceWorkerState::Activating,
    )?;
    info!("Activating");

    let result = async {
      let cache = self.router.cache();
      let report = cache.prune_stale_namespaces(&cache.names().keep_set())?;
      cache.open_live_namespaces()?;
      self.host.claim_clients().await?;
      Ok::<_, color_eyre::Report>(report)
    }
    .await;

    match result {
      Ok(report) => {
        self.set_state(ServiceWorkerState::Activated);
        Ok(EventOutcome::Activated(report))
      }
      Err(e) => {
        warn!(error = %e, "Activation failed");
        self.set_state(ServiceWorkerState::Installed);
        Err(e)
      }
    }
  }

  async fn fetch(&self, request: &Request) -> EventOutcome {
    if self.state() != ServiceWorkerState::Activated {
      return EventOutcome::PassThrough;
    }

    match self.router.handle(request).await {
      Some(response) => EventOutcome::Response(response),
      None => EventOutcome::PassThrough,
    }
  }

  async fn push(&self, payload: Option<Vec<u8>>) -> Result<EventOutcome> {
    let Some(payload) = payload else {
      return Ok(EventOutcome::Ignored);
    };

    let notification = Notification::from_push(&payload);
    self.host.show_notification(&notification).await?;
    Ok(EventOutcome::NotificationShown(notification))
  }

  async fn notification_click(&self, click: NotificationClick) -> Result<EventOutcome> {
    self.host.close_notification(&click.notification).await?;

    let url = click.target_url();
    self.host.open_window(&url).await?;
    Ok(EventOutcome::WindowOpened(url))
  }

  async fn sync(&self, tag: &str) -> Result<EventOutcome> {
    if tag != BACKGROUND_SYNC_TAG {
      return Ok(EventOutcome::Ignored);
    }

    self.process_background_sync().await?;
    Ok(EventOutcome::Synced)
  }

  /// Replays actions queued while offline (reminder updates, chat logs).
  /// Nothing is queued yet, so there is nothing to replay.
  async fn process_background_sync(&self) -> Result<()> {
    info!("Processing background sync");
    Ok(())
  }
}
